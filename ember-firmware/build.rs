//! Build script for ember-firmware
//!
//! - Sets up linker search paths for memory.x
//! - Validates heater.toml and turns it into Rust constants

use std::env;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

fn main() {
    setup_linker();
    generate_board_config();
}

/// Set up linker search paths and scripts
fn setup_linker() {
    let out_dir = PathBuf::from(env::var("OUT_DIR").unwrap());

    // Copy memory.x to the output directory
    let memory_x = include_bytes!("memory.x");
    let mut f = File::create(out_dir.join("memory.x")).unwrap();
    f.write_all(memory_x).unwrap();

    // Tell rustc where to find memory.x
    println!("cargo:rustc-link-search={}", out_dir.display());

    println!("cargo:rustc-link-arg-bins=--nmagic");
    println!("cargo:rustc-link-arg-bins=-Tlink.x");
    println!("cargo:rustc-link-arg-bins=-Tlink-rp.x");
    println!("cargo:rustc-link-arg-bins=-Tdefmt.x");

    println!("cargo:rerun-if-changed=memory.x");
    println!("cargo:rerun-if-changed=build.rs");
}

/// Fan models and the constant each selects
const FANS: &[(&str, &str)] = &[("dbw46", "FanModel::Dbw46"), ("toy_blower", "FanModel::ToyBlower")];

/// Nozzle models and the constant each selects
const NOZZLES: &[(&str, &str)] = &[("hago", "NozzleModel::Hago"), ("delavan", "NozzleModel::Delavan")];

/// Pressure transducers and the constant each selects
const PRESSURE_SENSORS: &[(&str, &str)] = &[
    ("mpx4250", "PressureSensor::Mpx4250"),
    ("mpx5100", "PressureSensor::Mpx5100"),
];

/// Validate heater.toml and write `board_config.rs` into OUT_DIR
fn generate_board_config() {
    println!("cargo:rerun-if-changed=heater.toml");

    let config_path = Path::new("heater.toml");
    if !config_path.exists() {
        panic!(
            "\n\
            ╔══════════════════════════════════════════════════════════════════╗\n\
            ║  ERROR: heater.toml not found!                                   ║\n\
            ║                                                                  ║\n\
            ║  The firmware needs to know which burner it drives.              ║\n\
            ║  Create heater.toml in the ember-firmware directory.             ║\n\
            ╚══════════════════════════════════════════════════════════════════╝\n"
        );
    }

    let content = match fs::read_to_string(config_path) {
        Ok(content) => content,
        Err(e) => {
            panic!(
                "\n\
                ╔══════════════════════════════════════════════════════════════════╗\n\
                ║  ERROR: Failed to read heater.toml                               ║\n\
                ║                                                                  ║\n\
                ║  Error: {:<56} ║\n\
                ╚══════════════════════════════════════════════════════════════════╝\n",
                e
            );
        }
    };

    let config: toml::Value = match toml::from_str(&content) {
        Ok(value) => value,
        Err(e) => {
            panic!(
                "\n\
                ╔══════════════════════════════════════════════════════════════════╗\n\
                ║  ERROR: Invalid TOML syntax in heater.toml                       ║\n\
                ╠══════════════════════════════════════════════════════════════════╣\n\
                {}\n\
                ╚══════════════════════════════════════════════════════════════════╝\n",
                format_error_lines(&e.to_string())
            );
        }
    };

    let mut errors = Vec::new();
    let fan = select(&config, "burner", "fan", FANS, "dbw46", &mut errors);
    let nozzle = select(&config, "burner", "nozzle", NOZZLES, "hago", &mut errors);
    let pressure = select(
        &config,
        "sensors",
        "pressure",
        PRESSURE_SENSORS,
        "mpx4250",
        &mut errors,
    );

    if !errors.is_empty() {
        panic!(
            "\n\
            ╔══════════════════════════════════════════════════════════════════╗\n\
            ║  ERROR: Invalid heater configuration                             ║\n\
            ╠══════════════════════════════════════════════════════════════════╣\n\
            {}\n\
            ╚══════════════════════════════════════════════════════════════════╝\n",
            errors
                .iter()
                .map(|e| format!("║  • {:<62} ║", e))
                .collect::<Vec<_>>()
                .join("\n")
        );
    }

    let out_dir = PathBuf::from(env::var("OUT_DIR").unwrap());
    let generated = format!(
        "/// Burner fitted to this board\n\
         pub const BURNER: BurnerProfile = BurnerProfile {{ fan: {fan}, nozzle: {nozzle} }};\n\
         \n\
         /// Nozzle air pressure transducer fitted to this board\n\
         pub const PRESSURE_SENSOR: PressureSensor = {pressure};\n"
    );
    fs::write(out_dir.join("board_config.rs"), generated).unwrap();
}

/// Look up `[section] key` among `choices`, falling back to `default`
fn select(
    config: &toml::Value,
    section: &str,
    key: &str,
    choices: &[(&str, &'static str)],
    default: &str,
    errors: &mut Vec<String>,
) -> &'static str {
    let value = match config.get(section).and_then(|s| s.get(key)) {
        None => default,
        Some(toml::Value::String(s)) => s.as_str(),
        Some(_) => {
            errors.push(format!("[{}] {} must be a string", section, key));
            default
        }
    };

    match choices.iter().find(|(name, _)| *name == value) {
        Some((_, constant)) => constant,
        None => {
            let names: Vec<&str> = choices.iter().map(|(name, _)| *name).collect();
            errors.push(format!(
                "[{}] {} must be one of: {}",
                section,
                key,
                names.join(", ")
            ));
            choices[0].1
        }
    }
}

/// Format error message lines with box drawing
fn format_error_lines(msg: &str) -> String {
    msg.lines()
        .map(|line| {
            let truncated = if line.len() > 64 {
                format!("{}...", &line[..61])
            } else {
                line.to_string()
            };
            format!("║  {:<64} ║", truncated)
        })
        .collect::<Vec<_>>()
        .join("\n")
}
