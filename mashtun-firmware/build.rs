//! Build script for mashtun-firmware
//!
//! - Sets up linker search paths for memory.x
//! - Validates brew.toml at compile time
//! - Generates board_config.rs from brew.toml

use std::env;
use std::fmt::Write as _;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

/// GPIOs that can drive an output (GPIO0/1 are the link UART)
const OUTPUT_PINS: std::ops::RangeInclusive<i64> = 2..=22;

/// GPIOs wired to the ADC
const ADC_PINS: std::ops::RangeInclusive<i64> = 26..=28;

/// Registry capacity, main sensor and valve included
const MAX_DEVICES: usize = 6;

fn main() {
    setup_linker();
    let config = load_config();
    let board = validate_config(&config);
    generate_board_config(&board);
}

/// Set up linker search paths for memory.x
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

    // Re-run if memory.x changes
    println!("cargo:rerun-if-changed=memory.x");
    println!("cargo:rerun-if-changed=build.rs");
}

/// Read and parse brew.toml
fn load_config() -> toml::Value {
    println!("cargo:rerun-if-changed=brew.toml");

    let config_path = Path::new("brew.toml");

    if !config_path.exists() {
        panic!(
            "\n\
            ╔══════════════════════════════════════════════════════════════════╗\n\
            ║  ERROR: brew.toml not found!                                     ║\n\
            ║                                                                  ║\n\
            ║  The firmware requires a brew.toml board description.            ║\n\
            ║  Please create one in the mashtun-firmware directory.            ║\n\
            ╚══════════════════════════════════════════════════════════════════╝\n"
        );
    }

    let content = match fs::read_to_string(config_path) {
        Ok(content) => content,
        Err(e) => {
            panic!(
                "\n\
                ╔══════════════════════════════════════════════════════════════════╗\n\
                ║  ERROR: Failed to read brew.toml                                 ║\n\
                ║                                                                  ║\n\
                ║  Error: {:<56} ║\n\
                ╚══════════════════════════════════════════════════════════════════╝\n",
                e
            );
        }
    };

    match toml::from_str(&content) {
        Ok(value) => value,
        Err(e) => {
            let error_msg = e.to_string();
            panic!(
                "\n\
                ╔══════════════════════════════════════════════════════════════════╗\n\
                ║  ERROR: Invalid TOML syntax in brew.toml                         ║\n\
                ╠══════════════════════════════════════════════════════════════════╣\n\
                ║                                                                  ║\n\
                {}\n\
                ║                                                                  ║\n\
                ╚══════════════════════════════════════════════════════════════════╝\n",
                format_error_lines(&error_msg)
            );
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

/// Validated board description
struct Board {
    baud: i64,
    time_unit_ms: i64,
    tick_ms: i64,
    main_sensor: SensorPin,
    valve: Valve,
    sensors: Vec<SensorPin>,
    relays: Vec<RelayPin>,
}

struct SensorPin {
    pin: i64,
    pullup_ohms: i64,
}

struct RelayPin {
    pin: i64,
    active_low: bool,
}

struct Valve {
    pin: i64,
    coils: Vec<i64>,
    step_delay_us: i64,
    steps_per_turn: i64,
    closed_offset_steps: i64,
    min_angle: f64,
    max_angle: f64,
    ignition_hold_ms: i64,
    kp: f64,
    ki: f64,
    kd: f64,
}

/// Collects validation errors for one report
#[derive(Default)]
struct Checker {
    errors: Vec<String>,
}

impl Checker {
    fn integer(&mut self, table: Option<&toml::Value>, section: &str, key: &str) -> i64 {
        match table.and_then(|t| t.get(key)) {
            Some(toml::Value::Integer(value)) => *value,
            Some(_) => {
                self.errors.push(format!("[{}] '{}' must be an integer", section, key));
                0
            }
            None => {
                self.errors.push(format!("[{}] missing '{}'", section, key));
                0
            }
        }
    }

    fn in_range(
        &mut self,
        table: Option<&toml::Value>,
        section: &str,
        key: &str,
        range: std::ops::RangeInclusive<i64>,
    ) -> i64 {
        let value = self.integer(table, section, key);
        if !range.contains(&value) {
            self.errors.push(format!(
                "[{}] '{}' must be {}-{}",
                section,
                key,
                range.start(),
                range.end()
            ));
        }
        value
    }

    fn float(&mut self, table: Option<&toml::Value>, section: &str, key: &str) -> f64 {
        match table.and_then(|t| t.get(key)) {
            Some(toml::Value::Float(value)) if value.is_finite() => *value,
            Some(toml::Value::Integer(value)) => *value as f64,
            Some(_) => {
                self.errors.push(format!("[{}] '{}' must be a number", section, key));
                0.0
            }
            None => {
                self.errors.push(format!("[{}] missing '{}'", section, key));
                0.0
            }
        }
    }

    fn boolean(&mut self, table: Option<&toml::Value>, section: &str, key: &str) -> bool {
        match table.and_then(|t| t.get(key)) {
            Some(toml::Value::Boolean(value)) => *value,
            Some(_) => {
                self.errors.push(format!("[{}] '{}' must be true or false", section, key));
                false
            }
            None => false,
        }
    }

    fn section<'a>(&mut self, config: &'a toml::Value, name: &str) -> Option<&'a toml::Value> {
        let section = config.get(name);
        if section.is_none() {
            self.errors.push(format!("Missing [{}] section", name));
        }
        section
    }

    fn sensor(&mut self, table: Option<&toml::Value>, section: &str) -> SensorPin {
        SensorPin {
            pin: self.in_range(table, section, "pin", ADC_PINS),
            pullup_ohms: self.in_range(table, section, "pullup_ohms", 1..=1_000_000),
        }
    }
}

/// Validate brew.toml and extract the board description
fn validate_config(config: &toml::Value) -> Board {
    let mut check = Checker::default();

    let link = check.section(config, "link");
    let baud = check.in_range(link, "link", "baud", 1_200..=921_600);

    let control = check.section(config, "control");
    let time_unit_ms = check.in_range(control, "control", "time_unit_ms", 1..=i64::from(u32::MAX));
    let tick_ms = check.in_range(control, "control", "tick_ms", 10..=60_000);

    let main_sensor = check.section(config, "main_sensor");
    let main_sensor = check.sensor(main_sensor, "main_sensor");

    let valve = check.section(config, "valve");
    let valve = validate_valve(&mut check, valve);

    let sensors = tables(&mut check, config, "sensor")
        .iter()
        .map(|t| check.sensor(Some(t), "[sensor]"))
        .collect::<Vec<_>>();

    let relays = tables(&mut check, config, "relay")
        .iter()
        .map(|t| RelayPin {
            pin: check.in_range(Some(t), "[relay]", "pin", OUTPUT_PINS),
            active_low: check.boolean(Some(t), "[relay]", "active_low"),
        })
        .collect::<Vec<_>>();

    let device_count = 2 + sensors.len() + relays.len();
    if device_count > MAX_DEVICES {
        check.errors.push(format!(
            "{} devices configured, the controller holds at most {}",
            device_count, MAX_DEVICES
        ));
    }

    // Every GPIO may be claimed once
    let mut claimed = vec![main_sensor.pin];
    claimed.extend(&valve.coils);
    claimed.extend(sensors.iter().map(|s| s.pin));
    claimed.extend(relays.iter().map(|r| r.pin));
    for (i, pin) in claimed.iter().enumerate() {
        if claimed[..i].contains(pin) {
            check.errors.push(format!("GPIO{} is used more than once", pin));
        }
    }

    if !check.errors.is_empty() {
        panic!(
            "\n\
            ╔══════════════════════════════════════════════════════════════════╗\n\
            ║  ERROR: Invalid board description in brew.toml                   ║\n\
            ╠══════════════════════════════════════════════════════════════════╣\n\
            {}\n\
            ╚══════════════════════════════════════════════════════════════════╝\n",
            check
                .errors
                .iter()
                .map(|e| format!("║  • {:<62} ║", e))
                .collect::<Vec<_>>()
                .join("\n")
        );
    }

    println!("cargo:warning=brew.toml validated successfully");

    Board {
        baud,
        time_unit_ms,
        tick_ms,
        main_sensor,
        valve,
        sensors,
        relays,
    }
}

/// Validate the [valve] section
fn validate_valve(check: &mut Checker, valve: Option<&toml::Value>) -> Valve {
    let section = "valve";

    let coils = match valve.and_then(|t| t.get("coils")) {
        Some(toml::Value::Array(pins)) => pins
            .iter()
            .map(|pin| match pin {
                toml::Value::Integer(pin) if OUTPUT_PINS.contains(pin) => *pin,
                _ => {
                    check.errors.push(format!(
                        "[valve] coils must be GPIO {}-{}",
                        OUTPUT_PINS.start(),
                        OUTPUT_PINS.end()
                    ));
                    0
                }
            })
            .collect::<Vec<_>>(),
        _ => Vec::new(),
    };
    if coils.len() != 4 {
        check.errors.push("[valve] 'coils' must list exactly 4 pins".to_string());
    }

    let pin = check.in_range(valve, section, "pin", OUTPUT_PINS);
    if !coils.contains(&pin) {
        check.errors.push("[valve] 'pin' must be one of the coils".to_string());
    }

    let min_angle = check.float(valve, section, "min_angle");
    let max_angle = check.float(valve, section, "max_angle");
    if !(0.0..=1.0).contains(&min_angle) || !(0.0..=1.0).contains(&max_angle) {
        check.errors.push("[valve] angles must be 0.0-1.0 turns".to_string());
    }
    if min_angle >= max_angle {
        check.errors.push("[valve] min_angle must be below max_angle".to_string());
    }

    let kp = check.float(valve, section, "kp");
    let ki = check.float(valve, section, "ki");
    let kd = check.float(valve, section, "kd");
    if kp < 0.0 || ki < 0.0 || kd < 0.0 {
        check.errors.push("[valve] PID gains must not be negative".to_string());
    }

    Valve {
        pin,
        coils,
        step_delay_us: check.in_range(valve, section, "step_delay_us", 500..=100_000),
        steps_per_turn: check.in_range(valve, section, "steps_per_turn", 1..=100_000),
        closed_offset_steps: check.in_range(valve, section, "closed_offset_steps", 0..=10_000),
        min_angle,
        max_angle,
        ignition_hold_ms: check.in_range(valve, section, "ignition_hold_ms", 0..=30_000),
        kp,
        ki,
        kd,
    }
}

/// Entries of an optional `[[name]]` array of tables
fn tables(check: &mut Checker, config: &toml::Value, name: &str) -> Vec<toml::Value> {
    match config.get(name) {
        Some(toml::Value::Array(entries)) => entries.clone(),
        Some(_) => {
            check.errors.push(format!("[[{}]] must be an array of tables", name));
            Vec::new()
        }
        None => Vec::new(),
    }
}

/// Write board_config.rs into OUT_DIR
fn generate_board_config(board: &Board) {
    let mut out = String::new();
    let valve = &board.valve;

    writeln!(out, "// Generated by build.rs from brew.toml. Do not edit.").unwrap();
    writeln!(out).unwrap();
    writeln!(out, "pub const LINK_BAUD: u32 = {};", board.baud).unwrap();
    writeln!(out, "pub const TIME_UNIT_MS: u32 = {};", board.time_unit_ms).unwrap();
    writeln!(out, "pub const TICK_MS: u64 = {};", board.tick_ms).unwrap();
    writeln!(out, "pub const MAIN_SENSOR_PIN: u8 = {};", board.main_sensor.pin).unwrap();
    writeln!(
        out,
        "pub const MAIN_SENSOR_PULLUP_OHMS: u32 = {};",
        board.main_sensor.pullup_ohms
    )
    .unwrap();
    writeln!(out, "pub const VALVE_PIN: u8 = {};", valve.pin).unwrap();
    writeln!(
        out,
        "pub const STEPPER_CONFIG: HalfStepConfig = HalfStepConfig {{ step_delay_us: {}, release_when_idle: true }};",
        valve.step_delay_us
    )
    .unwrap();
    writeln!(
        out,
        "pub const VALVE_CONFIG: ValveConfig = ValveConfig {{ \
         gains: PidGains {{ kp: {:?}, ki: {:?}, kd: {:?} }}, \
         min_angle: {:?}, max_angle: {:?}, steps_per_turn: {}, \
         closed_offset_steps: {}, ignition_hold_ms: {} }};",
        valve.kp as f32,
        valve.ki as f32,
        valve.kd as f32,
        valve.min_angle as f32,
        valve.max_angle as f32,
        valve.steps_per_turn,
        valve.closed_offset_steps,
        valve.ignition_hold_ms
    )
    .unwrap();

    let sensors = board
        .sensors
        .iter()
        .map(|s| format!("({}, {})", s.pin, s.pullup_ohms))
        .collect::<Vec<_>>()
        .join(", ");
    writeln!(out, "/// Extra probes as (pin, pull-up ohms)").unwrap();
    writeln!(out, "pub const EXTRA_SENSORS: [(u8, u32); {}] = [{}];", board.sensors.len(), sensors).unwrap();

    let relays = board
        .relays
        .iter()
        .map(|r| format!("({}, {})", r.pin, r.active_low))
        .collect::<Vec<_>>()
        .join(", ");
    writeln!(out, "/// Extra relays as (pin, active low)").unwrap();
    writeln!(out, "pub const RELAYS: [(u8, bool); {}] = [{}];", board.relays.len(), relays).unwrap();

    // Peripheral fields can only be named literally, so the pin hand-over
    // is generated as a macro
    let adc = |pin: i64| {
        format!(
            "embassy_rp::adc::Channel::new_pin($p.PIN_{}, embassy_rp::gpio::Pull::None)",
            pin
        )
    };
    let gpio = |pin: &i64| {
        format!(
            "embassy_rp::Peri::<'static, embassy_rp::gpio::AnyPin>::from($p.PIN_{})",
            pin
        )
    };

    writeln!(out).unwrap();
    writeln!(out, "/// Take the configured pins out of the peripherals").unwrap();
    writeln!(out, "macro_rules! take_board_pins {{").unwrap();
    writeln!(out, "    ($p:expr) => {{").unwrap();
    writeln!(out, "        crate::board::BoardPins {{").unwrap();
    writeln!(out, "            main_sensor: {},", adc(board.main_sensor.pin)).unwrap();
    writeln!(
        out,
        "            valve_coils: [{}],",
        valve.coils.iter().map(gpio).collect::<Vec<_>>().join(", ")
    )
    .unwrap();
    writeln!(
        out,
        "            extra_sensors: [{}],",
        board.sensors.iter().map(|s| adc(s.pin)).collect::<Vec<_>>().join(", ")
    )
    .unwrap();
    writeln!(
        out,
        "            relays: [{}],",
        board.relays.iter().map(|r| gpio(&r.pin)).collect::<Vec<_>>().join(", ")
    )
    .unwrap();
    writeln!(out, "        }}").unwrap();
    writeln!(out, "    }};").unwrap();
    writeln!(out, "}}").unwrap();

    let out_dir = PathBuf::from(env::var("OUT_DIR").unwrap());
    fs::write(out_dir.join("board_config.rs"), out).unwrap();
}
