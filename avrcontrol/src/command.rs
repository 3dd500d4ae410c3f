use std::fmt;

/// A single Marantz web-control command, as posted in a `cmdN` form field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReceiverCommand {
    PowerOn,
    PowerOff,
    /// Input selector token (e.g. "MPLAY", "SAT/CBL")
    SelectInput(String),
    /// Attenuation magnitude 0..=80, sent negated
    SetMasterVolume(u8),
    /// Asks the web UI to refresh its cached zone status
    RefreshStatus,
}

impl fmt::Display for ReceiverCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReceiverCommand::PowerOn => f.write_str("PutZone_OnOff/ON"),
            ReceiverCommand::PowerOff => f.write_str("PutZone_OnOff/OFF"),
            ReceiverCommand::SelectInput(input) => write!(f, "PutZone_InputFunction/{}", input),
            ReceiverCommand::SetMasterVolume(units) => write!(f, "PutMasterVolumeSet/-{}", units),
            ReceiverCommand::RefreshStatus => f.write_str("aspMainZone_WebUpdateStatus/"),
        }
    }
}

/// Form fields `cmd0..cmdN` in command order.
pub fn form_fields(commands: &[ReceiverCommand]) -> Vec<(String, String)> {
    commands
        .iter()
        .enumerate()
        .map(|(i, command)| (format!("cmd{}", i), command.to_string()))
        .collect()
}
