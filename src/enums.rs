// MIT License - Copyright (c) 2018 rorr73
// Rust port of lifesospy

//! Enumerations and flag words used across the protocol.

use bitflags::bitflags;

/// Type of LifeSOS device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum DeviceType {
    HumidSensor = 0x01,
    HumidSensor2 = 0x02,
    TempSensor = 0x03,
    TempSensor2 = 0x04,
    FloodDetector = 0x05,
    FloodDetector2 = 0x06,
    MedicalButton = 0x08,
    LightSensor = 0x0a,
    LightDetector = 0x0b,
    InactivityReport = 0x0c,
    AnalogSensor = 0x0e,
    AnalogSensor2 = 0x0f,
    RemoteController = 0x10,
    CardReader = 0x12,
    KeyPad = 0x18,
    XKeyPad = 0x19,
    SmokeDetector = 0x20,
    PressureSensor = 0x22,
    PressureSensor2 = 0x23,
    CoDetector = 0x25,
    Co2Sensor = 0x26,
    Co2Sensor2 = 0x27,
    AcCurrentMeter = 0x28,
    AcCurrentMeter2 = 0x29,
    ThreePhaseAcMeter = 0x2b,
    GasDetector = 0x30,
    DoorMagnet = 0x40,
    Repeater = 0x41,
    VibrationSensor = 0x42,
    PirSensor = 0x50,
    StatusIndicator = 0x56,
    Repeater2 = 0x57,
    GlassBreakDetector = 0x60,
    RemoteSiren = 0x70,
    BaseUnit = 0x80,
    RfBell = 0x90,
    RfSw = 0xa0,
    RfSwOnTime = 0xa1,
    RfSiren = 0xc0,
    RfSirenOnTime = 0xc1,
}

impl DeviceType {
    pub fn from_value(value: u8) -> Option<Self> {
        use DeviceType::*;
        Some(match value {
            0x01 => HumidSensor,
            0x02 => HumidSensor2,
            0x03 => TempSensor,
            0x04 => TempSensor2,
            0x05 => FloodDetector,
            0x06 => FloodDetector2,
            0x08 => MedicalButton,
            0x0a => LightSensor,
            0x0b => LightDetector,
            0x0c => InactivityReport,
            0x0e => AnalogSensor,
            0x0f => AnalogSensor2,
            0x10 => RemoteController,
            0x12 => CardReader,
            0x18 => KeyPad,
            0x19 => XKeyPad,
            0x20 => SmokeDetector,
            0x22 => PressureSensor,
            0x23 => PressureSensor2,
            0x25 => CoDetector,
            0x26 => Co2Sensor,
            0x27 => Co2Sensor2,
            0x28 => AcCurrentMeter,
            0x29 => AcCurrentMeter2,
            0x2b => ThreePhaseAcMeter,
            0x30 => GasDetector,
            0x40 => DoorMagnet,
            0x41 => Repeater,
            0x42 => VibrationSensor,
            0x50 => PirSensor,
            0x56 => StatusIndicator,
            0x57 => Repeater2,
            0x60 => GlassBreakDetector,
            0x70 => RemoteSiren,
            0x80 => BaseUnit,
            0x90 => RfBell,
            0xa0 => RfSw,
            0xa1 => RfSwOnTime,
            0xc0 => RfSiren,
            0xc1 => RfSirenOnTime,
            _ => return None,
        })
    }
}

/// Type of event raised by a device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum DeviceEventCode {
    Button = 0x0a01,
    Away = 0x0a10,
    Disarm = 0x0a14,
    Home = 0x0a18,
    Heartbeat = 0x0a20,
    Reading = 0x0a24,
    PowerOnReset = 0x0a2a,
    BatteryLow = 0x0a30,
    Display = 0x0a33,
    Open = 0x0a40,
    Close = 0x0a48,
    Tamper = 0x0a50,
    Trigger = 0x0a58,
    Panic = 0x0a60,
}

impl DeviceEventCode {
    pub fn from_value(value: u16) -> Option<Self> {
        use DeviceEventCode::*;
        Some(match value {
            0x0a01 => Button,
            0x0a10 => Away,
            0x0a14 => Disarm,
            0x0a18 => Home,
            0x0a20 => Heartbeat,
            0x0a24 => Reading,
            0x0a2a => PowerOnReset,
            0x0a30 => BatteryLow,
            0x0a33 => Display,
            0x0a40 => Open,
            0x0a48 => Close,
            0x0a50 => Tamper,
            0x0a58 => Trigger,
            0x0a60 => Panic,
            _ => return None,
        })
    }
}

/// Mode of operation for the base unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum OperationMode {
    Disarm = 0x0,
    Home = 0x1,
    Away = 0x2,
    Monitor = 0x8,
}

impl OperationMode {
    pub fn from_value(value: u8) -> Option<Self> {
        match value {
            0x0 => Some(Self::Disarm),
            0x1 => Some(Self::Home),
            0x2 => Some(Self::Away),
            0x8 => Some(Self::Monitor),
            _ => None,
        }
    }
}

/// State of the base unit; extends [`OperationMode`] with the transitional
/// exit/entry delay states that exist only on this side of the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BaseUnitState {
    Disarm,
    Home,
    Away,
    Monitor,
    AwayExitDelay,
    AwayEntryDelay,
}

impl BaseUnitState {
    /// Equivalent state for an operation mode.
    pub fn from_operation_mode(mode: OperationMode) -> Self {
        match mode {
            OperationMode::Disarm => Self::Disarm,
            OperationMode::Home => Self::Home,
            OperationMode::Away => Self::Away,
            OperationMode::Monitor => Self::Monitor,
        }
    }
}

bitflags! {
    /// Device characteristics flags.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct DcFlags: u8 {
        const REPEATER    = 0x80;
        const BASE_UNIT   = 0x40;
        const TWO_WAY     = 0x20;
        const SUPERVISORY = 0x10;
        const RF_VOICE    = 0x08;
    }
}

bitflags! {
    /// Enable status flags; per-device behavioral toggles.
    ///
    /// Note `WARNING_BEEP_DELAY`/`PRE_WARNING` and `LATCHKEY`/`INACTIVITY`
    /// are aliased bits whose meaning depends on the device category.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct EsFlags: u16 {
        const BYPASS             = 0x8000;
        const DELAY              = 0x4000;
        const HOUR24             = 0x2000;
        const HOME_GUARD         = 0x1000;
        const WARNING_BEEP_DELAY = 0x0800;
        const PRE_WARNING        = 0x0800;
        const ALARM_SIREN        = 0x0400;
        const BELL               = 0x0200;
        const LATCHKEY           = 0x0100;
        const INACTIVITY         = 0x0100;
        const TWO_WAY            = 0x0020;
        const SUPERVISED         = 0x0010;
        const RF_VOICE           = 0x0008;
        const HOME_AUTO          = 0x0004;
    }
}

bitflags! {
    /// Special sensor status flags.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct SsFlags: u8 {
        /// Set for Controller, clear for Alarm.
        const CONTROL_ALARM      = 0x80;
        /// Set for High, clear for Low.
        const HIGH_LOW_OPERATION = 0x40;
        const HIGH_TRIGGERED     = 0x20;
        const LOW_TRIGGERED      = 0x10;
        const HIGH_STATE         = 0x08;
        const LOW_STATE          = 0x04;
    }
}

bitflags! {
    /// Switches activated when a device is triggered.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct SwitchFlags: u16 {
        const SW01 = 0x8000;
        const SW02 = 0x4000;
        const SW03 = 0x2000;
        const SW04 = 0x1000;
        const SW05 = 0x0800;
        const SW06 = 0x0400;
        const SW07 = 0x0200;
        const SW08 = 0x0100;
        const SW09 = 0x0080;
        const SW10 = 0x0040;
        const SW11 = 0x0020;
        const SW12 = 0x0010;
        const SW13 = 0x0008;
        const SW14 = 0x0004;
        const SW15 = 0x0002;
        const SW16 = 0x0001;
    }
}

/// Identifier for a switch on the base unit.
///
/// The wire values are not sequential; this is the mapping the base unit
/// actually uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u8)]
pub enum SwitchNumber {
    Sw01 = 0x6,
    Sw02 = 0x7,
    Sw03 = 0x4,
    Sw04 = 0x5,
    Sw05 = 0x8,
    Sw06 = 0x9,
    Sw07 = 0xa,
    Sw08 = 0xb,
    Sw09 = 0xe,
    Sw10 = 0xf,
    Sw11 = 0xc,
    Sw12 = 0xd,
    Sw13 = 0x0,
    Sw14 = 0x1,
    Sw15 = 0x2,
    Sw16 = 0x3,
}

/// All switches, in switch-number order.
pub const SWITCHES: [SwitchNumber; 16] = [
    SwitchNumber::Sw01,
    SwitchNumber::Sw02,
    SwitchNumber::Sw03,
    SwitchNumber::Sw04,
    SwitchNumber::Sw05,
    SwitchNumber::Sw06,
    SwitchNumber::Sw07,
    SwitchNumber::Sw08,
    SwitchNumber::Sw09,
    SwitchNumber::Sw10,
    SwitchNumber::Sw11,
    SwitchNumber::Sw12,
    SwitchNumber::Sw13,
    SwitchNumber::Sw14,
    SwitchNumber::Sw15,
    SwitchNumber::Sw16,
];

impl SwitchNumber {
    pub fn from_value(value: u8) -> Option<Self> {
        SWITCHES.iter().copied().find(|sw| *sw as u8 == value)
    }
}

/// State of a switch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum SwitchState {
    On = 0x4,
    Off = 0xc,
}

impl SwitchState {
    pub fn from_value(value: u8) -> Option<Self> {
        match value {
            0x4 => Some(Self::On),
            0xc => Some(Self::Off),
            _ => None,
        }
    }
}

/// Context for the type of event in a ContactID message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ContactIdEventQualifier {
    /// New event or opening.
    Event = 0x1,
    /// New restore or closing.
    Restore = 0x3,
    /// Previously reported condition still present.
    Repeat = 0x6,
}

impl ContactIdEventQualifier {
    pub fn from_value(value: u8) -> Option<Self> {
        match value {
            0x1 => Some(Self::Event),
            0x3 => Some(Self::Restore),
            0x6 => Some(Self::Repeat),
            _ => None,
        }
    }
}

/// Category of event in a ContactID message, derived from the top digit
/// of the event code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum ContactIdEventCategory {
    Alarm = 0x100,
    Supervisory = 0x200,
    Trouble = 0x300,
    OpenCloseAccess = 0x400,
    BypassDisable = 0x500,
    TestMisc = 0x600,
    Automation = 0x900,
}

impl ContactIdEventCategory {
    /// Category for an event code value (`code & 0xf00`).
    pub fn from_code_value(code: u16) -> Option<Self> {
        match code & 0xf00 {
            0x100 => Some(Self::Alarm),
            0x200 => Some(Self::Supervisory),
            0x300 => Some(Self::Trouble),
            0x400 => Some(Self::OpenCloseAccess),
            0x500 => Some(Self::BypassDisable),
            0x600 => Some(Self::TestMisc),
            0x900 => Some(Self::Automation),
            _ => None,
        }
    }
}

/// Type of event indicated by a ContactID message.
///
/// Only the codes the bridge classifies on are enumerated; messages with
/// other codes keep their raw value and category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum ContactIdEventCode {
    // Alarms
    MedicalAlarm = 0x100,
    PersonalEmergency = 0x101,
    FailToReportIn = 0x102,
    FireAlarm = 0x110,
    SmokeAlarm = 0x111,
    PanicAlarm = 0x120,
    Duress = 0x121,
    BurglarAlarm = 0x130,
    Perimeter = 0x131,
    Interior = 0x132,
    Hour24Burglar = 0x133,
    EntryExit = 0x134,
    BurglarSensorTampered = 0x137,
    GeneralAlarm = 0x140,
    SensorSupervisionFailure = 0x147,
    Hour24NonBurglary = 0x150,
    GasDetected = 0x151,
    WaterLeakage = 0x154,
    HighTemp = 0x158,
    LowTemp = 0x159,
    CarbonMonoxideDetected = 0x162,
    HighLimitAlarm = 0x168,
    LowLimitAlarm = 0x169,
    // Troubles
    SystemTrouble = 0x300,
    AcPowerLoss = 0x301,
    BaseUnitLowBattery = 0x302,
    SystemReset = 0x305,
    SensorTrouble = 0x380,
    LossOfSupervisionRf = 0x381,
    SensorTamper = 0x383,
    RfLowBattery = 0x384,
    // Open/Close
    Away = 0x400,
    OcByUser = 0x401,
    RemoteArmDisarm = 0x407,
    AwayQuickArm = 0x408,
    // Bypasses / disables
    ZoneSensorBypass = 0x570,
    Disarm = 0x573,
    Home = 0x574,
    // Test / misc.
    ManualTriggerTestReport = 0x601,
    PeriodicTestReport = 0x602,
    MotionStop = 0x617,
    TriggerMonitor = 0x618,
    MonitorMode = 0x619,
    // Personnel monitoring
    InactivityAlarm = 0x641,
    DoorOpenMonitor = 0x648,
    DoorCloseMonitor = 0x649,
    // Automation
    SwitchOnOff = 0x901,
    HighLimitOperation = 0x912,
    LowLimitOperation = 0x913,
}

impl ContactIdEventCode {
    pub fn from_value(value: u16) -> Option<Self> {
        use ContactIdEventCode::*;
        Some(match value {
            0x100 => MedicalAlarm,
            0x101 => PersonalEmergency,
            0x102 => FailToReportIn,
            0x110 => FireAlarm,
            0x111 => SmokeAlarm,
            0x120 => PanicAlarm,
            0x121 => Duress,
            0x130 => BurglarAlarm,
            0x131 => Perimeter,
            0x132 => Interior,
            0x133 => Hour24Burglar,
            0x134 => EntryExit,
            0x137 => BurglarSensorTampered,
            0x140 => GeneralAlarm,
            0x147 => SensorSupervisionFailure,
            0x150 => Hour24NonBurglary,
            0x151 => GasDetected,
            0x154 => WaterLeakage,
            0x158 => HighTemp,
            0x159 => LowTemp,
            0x162 => CarbonMonoxideDetected,
            0x168 => HighLimitAlarm,
            0x169 => LowLimitAlarm,
            0x300 => SystemTrouble,
            0x301 => AcPowerLoss,
            0x302 => BaseUnitLowBattery,
            0x305 => SystemReset,
            0x380 => SensorTrouble,
            0x381 => LossOfSupervisionRf,
            0x383 => SensorTamper,
            0x384 => RfLowBattery,
            0x400 => Away,
            0x401 => OcByUser,
            0x407 => RemoteArmDisarm,
            0x408 => AwayQuickArm,
            0x570 => ZoneSensorBypass,
            0x573 => Disarm,
            0x574 => Home,
            0x601 => ManualTriggerTestReport,
            0x602 => PeriodicTestReport,
            0x617 => MotionStop,
            0x618 => TriggerMonitor,
            0x619 => MonitorMode,
            0x641 => InactivityAlarm,
            0x648 => DoorOpenMonitor,
            0x649 => DoorCloseMonitor,
            0x901 => SwitchOnOff,
            0x912 => HighLimitOperation,
            0x913 => LowLimitOperation,
            _ => return None,
        })
    }
}
