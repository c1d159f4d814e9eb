//! Controller board I/O
//!
//! Everything the SysTick handler and the control tasks share lives in
//! one [`Board`] behind a critical-section mutex: the timer wheel, the
//! regulation loops, the dosing pump and the drivers they touch.
//!
//! Analog inputs go through an 8:1 multiplexer into ADC0; the supply
//! divider has ADC1 to itself. One sample cycle runs per regulation tick,
//! from the jiffy interrupt, and feeds the loops directly.
//!
//! | Function               | Pin          |
//! |------------------------|--------------|
//! | Mux select 0..2        | GPIO6..8     |
//! | Fuse input (high=open) | GPIO13       |
//! | Front-panel switch     | GPIO12       |
//! | Fan tachometer         | GPIO14       |
//! | Dosing pump solenoid   | GPIO15       |
//! | Compressor / fan PWM   | GPIO16/17    |
//! | Glow plug / nozzle PWM | GPIO18/19    |
//! | Circulation pump PWM   | GPIO20       |
//! | Vehicle fan relay      | GPIO21       |
//! | Aux solenoid           | GPIO22       |
//! | Mux analog / supply    | GPIO26/27    |

use core::cell::RefCell;

use defmt::*;
use embassy_rp::adc::{Adc, Blocking, Channel as AdcChannel};
use embassy_rp::gpio::{Input, Level, Output};
use embassy_rp::pwm::{Config as PwmConfig, Pwm};
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::blocking_mutex::Mutex;
use ember_core::config::HeaterConfig;
use ember_core::heater::{Actuator, Outputs, Readings, Sensor, ACTMAX};
use ember_core::traits::{ActuatorOutput, SensorInput};
use ember_drivers::sensor::{PressureSensor, RawSample};
use ember_drivers::{DosingPump, RegulationIo, RegulationLoops, Setpoints};
use ember_hal::clock::Jiffies;
use ember_hal::timer::{SoftTimers, TimerHandle, TimerService};
use heapless::Vec;

/// Timer slots: sample cycle and pump pulse train
const TIMER_SLOTS: usize = 4;

/// Multiplexer inputs
const MUX_SEEBECK: u8 = 0;
const MUX_HEAT_EXCHANGER: u8 = 1;
const MUX_NOZZLE: u8 = 2;
const MUX_PREHEAT_CURRENT: u8 = 3;
const MUX_PLUG_CURRENT: u8 = 4;
const MUX_PRESSURE: u8 = 5;

/// Multiplexer settling time after switching inputs, core cycles
const MUX_SETTLE_CYCLES: u32 = 250;

/// Shared board state
pub static BOARD: Mutex<CriticalSectionRawMutex, RefCell<Option<Board>>> =
    Mutex::new(RefCell::new(None));

/// Setpoints the regulation loops follow
pub static SETPOINTS: Setpoints = Setpoints::new();

/// PWM setup for every slice: top at ACTMAX so compare values are in the
/// actuator domain, about 1.2 kHz from the 125 MHz system clock
pub fn pwm_config() -> PwmConfig {
    let mut config = PwmConfig::default();
    config.top = ACTMAX;
    config.divider = 255u8.into();
    config.compare_a = 0;
    config.compare_b = 0;
    config
}

/// Peripherals handed to the board at startup
pub struct BoardParts {
    pub adc: Adc<'static, Blocking>,
    pub mux_select: [Output<'static>; 3],
    pub mux_input: AdcChannel<'static>,
    pub supply: AdcChannel<'static>,
    pub fuse: Input<'static>,
    pub button: Input<'static>,
    pub tachometer: Input<'static>,
    pub pump: Output<'static>,
    /// Compressor (A) and combustion fan (B)
    pub air: Pwm<'static>,
    /// Glow plug (A) and nozzle preheater (B)
    pub heat: Pwm<'static>,
    /// Circulation pump (A)
    pub circulation: Pwm<'static>,
    pub vehicle_fan: Output<'static>,
    pub aux: Output<'static>,
}

/// One PWM slice and its current compare values
struct PwmSlice {
    pwm: Pwm<'static>,
    config: PwmConfig,
}

impl PwmSlice {
    fn new(mut pwm: Pwm<'static>) -> Self {
        let config = pwm_config();
        pwm.set_config(&config);
        Self { pwm, config }
    }

    fn set_a(&mut self, value: u16) {
        let value = value.min(ACTMAX);
        if self.config.compare_a != value {
            self.config.compare_a = value;
            self.pwm.set_config(&self.config);
        }
    }

    fn set_b(&mut self, value: u16) {
        let value = value.min(ACTMAX);
        if self.config.compare_b != value {
            self.config.compare_b = value;
            self.pwm.set_config(&self.config);
        }
    }
}

/// Regulation loop I/O: the latest sample in, the air PWM out
///
/// Compressor and fan drivers are active low, which the loops' inverted
/// duty already accounts for.
struct LoopIo<'a> {
    air: &'a mut PwmSlice,
    readings: &'a Readings,
}

impl RegulationIo for LoopIo<'_> {
    fn pressure(&mut self) -> u16 {
        self.readings[Sensor::Pressure]
    }

    fn supply_mv(&mut self) -> u16 {
        self.readings[Sensor::Supply]
    }

    fn set_compressor_duty(&mut self, duty: u16) {
        self.air.set_a(duty);
    }

    fn set_fan_duty(&mut self, duty: u16) {
        self.air.set_b(duty);
    }
}

/// What one jiffy turned up
#[derive(Debug, Clone, Copy, Default)]
pub struct JiffyEvents {
    /// A timer callback asked for the scheduler
    pub wake: bool,
    /// The front-panel switch changed
    pub button_changed: bool,
}

pub struct Board {
    timers: SoftTimers<TIMER_SLOTS>,
    sampling: Option<TimerHandle>,
    loops: RegulationLoops,
    pump: DosingPump<Output<'static>>,
    adc: Adc<'static, Blocking>,
    mux_select: [Output<'static>; 3],
    mux_input: AdcChannel<'static>,
    supply: AdcChannel<'static>,
    fuse: Input<'static>,
    button: Input<'static>,
    tachometer: Input<'static>,
    air: PwmSlice,
    heat: PwmSlice,
    circulation: PwmSlice,
    vehicle_fan: Output<'static>,
    aux: Output<'static>,
    pressure_sensor: PressureSensor,
    raw: RawSample,
    readings: Readings,
    tach_high: bool,
    button_pressed: bool,
    powered: bool,
    tick_seen: bool,
    fresh: bool,
}

impl Board {
    pub fn new(parts: BoardParts, config: &HeaterConfig, pressure_sensor: PressureSensor) -> Self {
        let mut timers = SoftTimers::new();
        let sampling = timers.create(config.regulation_period);
        if sampling.is_none() {
            error!("No timer slot for the sample cycle");
        }

        Self {
            timers,
            sampling,
            loops: RegulationLoops::new(config),
            pump: DosingPump::new(parts.pump, config.jiffy_hz),
            adc: parts.adc,
            mux_select: parts.mux_select,
            mux_input: parts.mux_input,
            supply: parts.supply,
            fuse: parts.fuse,
            button: parts.button,
            tachometer: parts.tachometer,
            air: PwmSlice::new(parts.air),
            heat: PwmSlice::new(parts.heat),
            circulation: PwmSlice::new(parts.circulation),
            vehicle_fan: parts.vehicle_fan,
            aux: parts.aux,
            pressure_sensor,
            raw: RawSample::default(),
            readings: Readings::default(),
            tach_high: false,
            button_pressed: false,
            powered: false,
            tick_seen: false,
            fresh: false,
        }
    }

    /// Jiffy interrupt work
    fn on_jiffy(&mut self, now: Jiffies) -> JiffyEvents {
        let high = self.tachometer.is_high();
        if high && !self.tach_high {
            self.loops.fan_edge(now);
        }
        self.tach_high = high;

        let pressed = self.button.is_low();
        let button_changed = pressed != self.button_pressed;
        self.button_pressed = pressed;

        let mut fired: Vec<TimerHandle, TIMER_SLOTS> = Vec::new();
        self.timers.advance(1, |handle| {
            let _ = fired.push(handle);
            false
        });
        let wake = fired
            .into_iter()
            .fold(false, |wake, handle| self.on_timer(handle) | wake);

        JiffyEvents {
            wake,
            button_changed,
        }
    }

    /// Route one timer expiry; returns whether it requests a wakeup
    fn on_timer(&mut self, handle: TimerHandle) -> bool {
        if self.sampling == Some(handle) {
            self.sample();
            let mut io = LoopIo {
                air: &mut self.air,
                readings: &self.readings,
            };
            return self.loops.iterate(&SETPOINTS, &mut io);
        }

        if self.pump.timer() == Some(handle) {
            match self.pump.on_timer(&mut self.timers) {
                Ok(wake) => return wake,
                Err(_) => warn!("Dosing pump timer failed"),
            }
        }

        false
    }

    /// Run one sample cycle over every analog channel
    ///
    /// A failed conversion keeps the channel's previous value.
    fn sample(&mut self) {
        let last = self.raw;
        self.raw = RawSample {
            seebeck: self.mux_read(MUX_SEEBECK, last.seebeck),
            heat_exchanger: self.mux_read(MUX_HEAT_EXCHANGER, last.heat_exchanger),
            nozzle: self.mux_read(MUX_NOZZLE, last.nozzle),
            preheat_current: self.mux_read(MUX_PREHEAT_CURRENT, last.preheat_current),
            plug_current: self.mux_read(MUX_PLUG_CURRENT, last.plug_current),
            pressure: self.mux_read(MUX_PRESSURE, last.pressure),
            supply: self.adc.blocking_read(&mut self.supply).unwrap_or(last.supply),
            fuse_blown: self.fuse.is_high(),
        };
        self.raw.convert(self.pressure_sensor, &mut self.readings);
        self.tick_seen = true;
    }

    fn mux_read(&mut self, input: u8, previous: u16) -> u16 {
        for (bit, pin) in self.mux_select.iter_mut().enumerate() {
            pin.set_level(Level::from(input & (1 << bit) != 0));
        }
        cortex_m::asm::delay(MUX_SETTLE_CYCLES);
        self.adc.blocking_read(&mut self.mux_input).unwrap_or(previous)
    }

    fn drive(&mut self, outputs: &Outputs) {
        self.heat.set_a(outputs[Actuator::GlowPlug]);
        self.heat.set_b(outputs[Actuator::NozzleHeater]);
        self.circulation.set_a(outputs[Actuator::CirculationPump]);
        self.vehicle_fan
            .set_level(Level::from(outputs[Actuator::VehicleFan] >= ACTMAX / 2));
        self.aux
            .set_level(Level::from(outputs[Actuator::Aux] >= ACTMAX / 2));

        if self
            .pump
            .set_rate(outputs[Actuator::DosingPump], &mut self.timers)
            .is_err()
        {
            warn!("Dosing pump rejected rate {}", outputs[Actuator::DosingPump]);
        }
    }
}

/// Hand the board to the jiffy interrupt and the plant interface
pub fn install(board: Board) {
    BOARD.lock(|cell| cell.replace(Some(board)));
}

fn with_board<R: Default>(f: impl FnOnce(&mut Board) -> R) -> R {
    BOARD.lock(|cell| cell.borrow_mut().as_mut().map(f).unwrap_or_default())
}

/// Called from the SysTick handler once per jiffy
pub fn on_jiffy(now: Jiffies) -> JiffyEvents {
    with_board(|board| board.on_jiffy(now))
}

/// The board as seen by the controller
pub struct Plant;

impl SensorInput for Plant {
    fn read(&mut self, readings: &mut Readings) {
        with_board(|board| {
            for sensor in &Sensor::ALL[..=Sensor::Supply.index()] {
                readings[*sensor] = board.readings[*sensor];
            }
            readings[Sensor::FanSpeed] = board.loops.fan_rpm();
            if board.tick_seen {
                board.fresh = true;
            }
        })
    }

    fn is_fresh(&self) -> bool {
        with_board(|board| board.fresh)
    }

    fn invalidate(&mut self) {
        with_board(|board| {
            board.fresh = false;
            board.tick_seen = false;
        })
    }

    fn button(&mut self) -> bool {
        with_board(|board| board.button_pressed)
    }
}

impl ActuatorOutput for Plant {
    fn write(&mut self, outputs: &Outputs) {
        SETPOINTS.store(outputs);
        with_board(|board| board.drive(outputs))
    }

    fn set_power(&mut self, on: bool) {
        with_board(|board| {
            if board.powered == on {
                return;
            }
            board.powered = on;
            info!("Combustion power {}", if on { "on" } else { "off" });

            if on {
                board.loops.enable();
            } else {
                let mut io = LoopIo {
                    air: &mut board.air,
                    readings: &board.readings,
                };
                board.loops.disable(&mut io);
            }
        })
    }
}
