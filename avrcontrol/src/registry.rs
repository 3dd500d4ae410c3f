use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::errors::RegistryError;
use crate::model::{Appliance, ApplianceAction};

/// Catalogue entry as written in the configuration: the appliance itself
/// plus the input-select token of its model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplianceEntry {
    #[serde(flatten)]
    pub appliance: Appliance,
    /// Receiver input token (e.g. "MPLAY", "SAT/CBL"); none means the
    /// receiver keeps its current input on power-on.
    #[serde(default)]
    pub input_function: Option<String>,
}

/// Immutable catalogue of the appliances exposed to the voice assistant.
///
/// Order is the configuration order and is preserved by discovery.
#[derive(Debug, Clone, Default)]
pub struct ApplianceRegistry {
    appliances: Vec<Appliance>,
    input_functions: HashMap<String, String>,
}

impl ApplianceRegistry {
    pub fn new(entries: Vec<ApplianceEntry>) -> Result<Self, RegistryError> {
        let mut appliances = Vec::with_capacity(entries.len());
        let mut input_functions = HashMap::new();

        for entry in entries {
            let id = entry.appliance.appliance_id.trim();
            if id.is_empty() {
                return Err(RegistryError::InvalidCatalogue(format!(
                    "appliance '{}' has an empty applianceId",
                    entry.appliance.friendly_name
                )));
            }
            if appliances
                .iter()
                .any(|a: &Appliance| a.appliance_id == entry.appliance.appliance_id)
            {
                return Err(RegistryError::DuplicateId(entry.appliance.appliance_id));
            }
            if let Some(input) = entry.input_function.filter(|i| !i.trim().is_empty()) {
                input_functions.insert(entry.appliance.appliance_id.clone(), input);
            }
            appliances.push(entry.appliance);
        }

        debug!(count = appliances.len(), "Appliance registry built");
        Ok(Self {
            appliances,
            input_functions,
        })
    }

    /// The two SR6010 inputs shipped with the embedded configuration.
    pub fn default_catalogue() -> Self {
        let all_actions = vec![
            ApplianceAction::TurnOn,
            ApplianceAction::TurnOff,
            ApplianceAction::SetPercentage,
            ApplianceAction::IncrementPercentage,
            ApplianceAction::DecrementPercentage,
        ];

        let shield = Appliance {
            appliance_id: "marantz-sr6010-shield".to_string(),
            manufacturer_name: "Marantz nVidia".to_string(),
            model_name: "SR6010 Shield".to_string(),
            version: "1.0".to_string(),
            friendly_name: "Shield".to_string(),
            friendly_description: "nVidia Shield via Marantz SR6010".to_string(),
            is_reachable: true,
            actions: all_actions.clone(),
        };
        let cable = Appliance {
            appliance_id: "marantz-sr6010-cable".to_string(),
            manufacturer_name: "Marantz Cable".to_string(),
            model_name: "SR6010 Cable".to_string(),
            version: "1.0".to_string(),
            friendly_name: "Cable".to_string(),
            friendly_description: "Cable Box via Marantz SR6010".to_string(),
            is_reachable: true,
            actions: all_actions,
        };

        let input_functions = HashMap::from([
            (shield.appliance_id.clone(), "MPLAY".to_string()),
            (cable.appliance_id.clone(), "SAT/CBL".to_string()),
        ]);

        Self {
            appliances: vec![shield, cable],
            input_functions,
        }
    }

    pub fn list_appliances(&self) -> &[Appliance] {
        &self.appliances
    }

    pub fn find_appliance(&self, appliance_id: &str) -> Result<&Appliance, RegistryError> {
        self.appliances
            .iter()
            .find(|a| a.appliance_id == appliance_id)
            .ok_or_else(|| RegistryError::NotFound(appliance_id.to_string()))
    }

    /// Input-select token for the appliance's model, if it has one.
    pub fn input_function(&self, appliance_id: &str) -> Option<&str> {
        self.input_functions.get(appliance_id).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.appliances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.appliances.is_empty()
    }
}
