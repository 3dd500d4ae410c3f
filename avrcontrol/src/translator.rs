//! Directive → receiver command translation.
//!
//! The receiver expresses volume as an attenuation: `0` is the loudest
//! setting, `80` the quietest, and commands carry the value negated.

use std::str::FromStr;

use tracing::debug;

use crate::command::ReceiverCommand;
use crate::errors::TranslationError;
use crate::model::{ApplianceAction, DeviceState, DirectivePayload};
use crate::registry::ApplianceRegistry;

/// Full span of the attenuation scale
pub const VOLUME_SCALE: f64 = 80.0;

/// Relative changes that would go past full volume land here instead
pub const CLAMP_LOUDEST: u8 = 10;

/// Relative changes that would go past silence land here instead
pub const CLAMP_QUIETEST: u8 = 70;

pub const PERCENTAGE_MIN: u8 = 0;
pub const PERCENTAGE_MAX: u8 = 100;

/// Control directives understood by the adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DirectiveName {
    TurnOn,
    TurnOff,
    SetPercentage,
    IncrementPercentage,
    DecrementPercentage,
}

impl DirectiveName {
    pub fn request_name(&self) -> &'static str {
        match self {
            DirectiveName::TurnOn => "TurnOnRequest",
            DirectiveName::TurnOff => "TurnOffRequest",
            DirectiveName::SetPercentage => "SetPercentageRequest",
            DirectiveName::IncrementPercentage => "IncrementPercentageRequest",
            DirectiveName::DecrementPercentage => "DecrementPercentageRequest",
        }
    }

    pub fn confirmation_name(&self) -> &'static str {
        match self {
            DirectiveName::TurnOn => "TurnOnConfirmation",
            DirectiveName::TurnOff => "TurnOffConfirmation",
            DirectiveName::SetPercentage => "SetPercentageConfirmation",
            DirectiveName::IncrementPercentage => "IncrementPercentageConfirmation",
            DirectiveName::DecrementPercentage => "DecrementPercentageConfirmation",
        }
    }

    /// Capability the target appliance must advertise
    pub fn action(&self) -> ApplianceAction {
        match self {
            DirectiveName::TurnOn => ApplianceAction::TurnOn,
            DirectiveName::TurnOff => ApplianceAction::TurnOff,
            DirectiveName::SetPercentage => ApplianceAction::SetPercentage,
            DirectiveName::IncrementPercentage => ApplianceAction::IncrementPercentage,
            DirectiveName::DecrementPercentage => ApplianceAction::DecrementPercentage,
        }
    }

    /// Relative adjustments need a fresh receiver state read first
    pub fn needs_device_state(&self) -> bool {
        matches!(
            self,
            DirectiveName::IncrementPercentage | DirectiveName::DecrementPercentage
        )
    }
}

impl FromStr for DirectiveName {
    type Err = TranslationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "TurnOnRequest" => Ok(DirectiveName::TurnOn),
            "TurnOffRequest" => Ok(DirectiveName::TurnOff),
            "SetPercentageRequest" => Ok(DirectiveName::SetPercentage),
            "IncrementPercentageRequest" => Ok(DirectiveName::IncrementPercentage),
            "DecrementPercentageRequest" => Ok(DirectiveName::DecrementPercentage),
            other => Err(TranslationError::UnsupportedDirective(other.to_string())),
        }
    }
}

/// Checks the payload fields a directive needs, without any device I/O.
pub fn check_payload(
    directive: DirectiveName,
    payload: &DirectivePayload,
) -> Result<(), TranslationError> {
    match directive {
        DirectiveName::TurnOn | DirectiveName::TurnOff => Ok(()),
        DirectiveName::SetPercentage => percentage(payload).map(|_| ()),
        DirectiveName::IncrementPercentage | DirectiveName::DecrementPercentage => {
            delta(payload).map(|_| ())
        }
    }
}

fn percentage(payload: &DirectivePayload) -> Result<f64, TranslationError> {
    let value = payload
        .percentage()
        .ok_or(TranslationError::MissingField("percentageState"))?;
    if !(f64::from(PERCENTAGE_MIN)..=f64::from(PERCENTAGE_MAX)).contains(&value) {
        return Err(TranslationError::OutOfRange {
            field: "percentageState",
            value,
            min: PERCENTAGE_MIN,
            max: PERCENTAGE_MAX,
        });
    }
    Ok(value)
}

/// A zero delta is no change at all and counts as missing.
fn delta(payload: &DirectivePayload) -> Result<f64, TranslationError> {
    payload
        .delta()
        .filter(|d| *d != 0.0)
        .ok_or(TranslationError::MissingField("deltaPercentage"))
}

/// Percentage (0 = silent, 100 = loudest) to attenuation units.
pub fn percentage_to_units(percentage: f64) -> u8 {
    let units = ((100.0 - percentage) / 100.0 * VOLUME_SCALE).round();
    units.clamp(0.0, VOLUME_SCALE) as u8
}

/// Applies a relative change to the current attenuation.
///
/// `louder` lowers the attenuation. Out-of-scale results are pulled back to
/// [`CLAMP_LOUDEST`] / [`CLAMP_QUIETEST`] rather than the scale limits.
pub fn adjust_units(current: f64, delta_percentage: f64, louder: bool) -> u8 {
    let step = delta_percentage / 100.0 * VOLUME_SCALE;
    let raw = (if louder { current - step } else { current + step }).round();

    if raw < 0.0 {
        CLAMP_LOUDEST
    } else if raw > VOLUME_SCALE {
        CLAMP_QUIETEST
    } else {
        raw as u8
    }
}

/// Builds receiver command sequences for the appliances of a registry.
#[derive(Debug, Clone, Copy)]
pub struct CommandTranslator<'a> {
    registry: &'a ApplianceRegistry,
}

impl<'a> CommandTranslator<'a> {
    pub fn new(registry: &'a ApplianceRegistry) -> Self {
        Self { registry }
    }

    /// Ordered commands for `directive` on `appliance_id`.
    ///
    /// Every successful translation ends with [`ReceiverCommand::RefreshStatus`].
    /// `current` is required for relative volume changes and ignored otherwise.
    pub fn translate(
        &self,
        directive: DirectiveName,
        appliance_id: &str,
        payload: &DirectivePayload,
        current: Option<&DeviceState>,
    ) -> Result<Vec<ReceiverCommand>, TranslationError> {
        let mut commands = Vec::with_capacity(3);

        match directive {
            DirectiveName::TurnOn => {
                commands.push(ReceiverCommand::PowerOn);
                if let Some(input) = self.registry.input_function(appliance_id) {
                    commands.push(ReceiverCommand::SelectInput(input.to_string()));
                }
            }
            DirectiveName::TurnOff => commands.push(ReceiverCommand::PowerOff),
            DirectiveName::SetPercentage => {
                let units = percentage_to_units(percentage(payload)?);
                commands.push(ReceiverCommand::SetMasterVolume(units));
            }
            DirectiveName::IncrementPercentage | DirectiveName::DecrementPercentage => {
                let delta = delta(payload)?;
                let state = current.ok_or(TranslationError::MissingDeviceState)?;
                let louder = directive == DirectiveName::IncrementPercentage;
                let units = adjust_units(state.volume, delta, louder);
                commands.push(ReceiverCommand::SetMasterVolume(units));
            }
        }

        commands.push(ReceiverCommand::RefreshStatus);
        debug!(
            directive = directive.request_name(),
            appliance_id,
            commands = ?commands,
            "Directive translated"
        );
        Ok(commands)
    }
}
