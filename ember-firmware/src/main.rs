//! Ember - Parking Heater Controller Firmware
//!
//! Main firmware binary for RP2040-based heater controller boards.
//! The control and sensor tasks run on ember-core's cooperative kernel;
//! SysTick provides the jiffy clock and drives the regulation loops and
//! the dosing pump from the board's timer wheel.

#![no_std]
#![no_main]

use core::pin::pin;

use cortex_m_rt::{entry, exception};
use defmt::*;
use embassy_rp::adc::{Adc, Channel as AdcChannel, Config as AdcConfig};
use embassy_rp::gpio::{Input, Level, Output, Pull};
use embassy_rp::pwm::Pwm;
use ember_core::config::HeaterConfig;
use ember_core::kernel::{Kernel, Scheduler, WakeTarget};
use ember_core::Controller;
use {defmt_rtt as _, panic_probe as _};

use crate::board::{Board, BoardParts, Plant};
use crate::flash::RecordFlash;
use crate::jiffies::{JiffyClock, JIFFY_HZ};

mod board;
mod flash;
mod jiffies;

/// Burner build selected in heater.toml
mod board_config {
    use ember_core::config::{BurnerProfile, FanModel, NozzleModel};
    use ember_drivers::sensor::PressureSensor;

    include!(concat!(env!("OUT_DIR"), "/board_config.rs"));
}

/// Scheduler tasks: control, sensors
const TASKS: usize = 2;

static KERNEL: Kernel<TASKS> = Kernel::new();
static CLOCK: JiffyClock = JiffyClock;

#[entry]
fn main() -> ! {
    info!("Ember firmware starting...");

    let p = embassy_rp::init(Default::default());
    let core = unwrap!(cortex_m::Peripherals::take());

    let config = HeaterConfig::for_burner(JIFFY_HZ, board_config::BURNER);
    info!("Burner: {}", config.burner);

    let parts = BoardParts {
        adc: Adc::new_blocking(p.ADC, AdcConfig::default()),
        mux_select: [
            Output::new(p.PIN_6, Level::Low),
            Output::new(p.PIN_7, Level::Low),
            Output::new(p.PIN_8, Level::Low),
        ],
        mux_input: AdcChannel::new_pin(p.PIN_26, Pull::None),
        supply: AdcChannel::new_pin(p.PIN_27, Pull::None),
        fuse: Input::new(p.PIN_13, Pull::Up),
        button: Input::new(p.PIN_12, Pull::Up),
        tachometer: Input::new(p.PIN_14, Pull::Up),
        pump: Output::new(p.PIN_15, Level::Low),
        air: Pwm::new_output_ab(p.PWM_SLICE0, p.PIN_16, p.PIN_17, board::pwm_config()),
        heat: Pwm::new_output_ab(p.PWM_SLICE1, p.PIN_18, p.PIN_19, board::pwm_config()),
        circulation: Pwm::new_output_a(p.PWM_SLICE2, p.PIN_20, board::pwm_config()),
        vehicle_fan: Output::new(p.PIN_21, Level::Low),
        aux: Output::new(p.PIN_22, Level::Low),
    };
    board::install(Board::new(parts, &config, board_config::PRESSURE_SENSOR));

    jiffies::start(core.SYST, embassy_rp::clocks::clk_sys_freq());
    info!("Jiffy clock running at {} Hz", JIFFY_HZ);

    let storage = RecordFlash::new(p.FLASH, p.DMA_CH0);
    let controller = Controller::new(&KERNEL, &CLOCK, config, Plant, storage);
    info!(
        "Restored {} start(s), {} logged error(s)",
        controller.snapshot().persistent.start_counter,
        controller.errors().len()
    );

    let control = pin!(controller.control_task());
    let sensors = pin!(controller.sensor_task());

    let mut scheduler = Scheduler::new(&KERNEL, &CLOCK);
    unwrap!(scheduler.register(control));
    unwrap!(scheduler.register(sensors));

    info!("Scheduler running");
    scheduler.run()
}

#[exception]
fn SysTick() {
    let now = jiffies::tick();
    let events = board::on_jiffy(now);

    // A parked control task has to see the switch
    if events.button_changed {
        KERNEL.wakeup(WakeTarget::All);
    }
    if events.wake || events.button_changed {
        jiffies::request_wake();
    }
}
