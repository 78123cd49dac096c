//! Localization tables (English and German).
//!
//! Keys are entity kind names, field column names and a few dialog strings.
//! Lookups never fail: an unknown key renders as itself.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::ModelError;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Locale {
    #[default]
    En,
    De,
}

impl Locale {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::En => "en",
            Self::De => "de",
        }
    }
}

impl FromStr for Locale {
    type Err = ModelError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let lang = raw.trim().to_ascii_lowercase();
        // Accept region-qualified tags such as `de-DE`.
        match lang.split(['-', '_']).next().unwrap_or_default() {
            "en" => Ok(Self::En),
            "de" => Ok(Self::De),
            _ => Err(ModelError::InvalidValue { field: "locale".into(), reason: format!("unsupported language {raw}") }),
        }
    }
}

const EN: &[(&str, &str)] = &[
    ("line", "Line"),
    ("station", "Station"),
    ("tool", "Tool"),
    ("operation", "Operation"),
    ("name", "Name"),
    ("comment", "Comment"),
    ("status_color", "Status color"),
    ("assembly_area", "Assembly area"),
    ("description", "Description"),
    ("station_type", "Station type"),
    ("serial_or_parallel", "Serial or parallel"),
    ("tool_class", "Tool class"),
    ("tool_type", "Tool type"),
    ("ip_address_device", "IP address (device)"),
    ("sps_plc_name_spa_service", "PLC name (SPA service)"),
    ("sps_db_no_send", "PLC DB no. send"),
    ("sps_db_no_receive", "PLC DB no. receive"),
    ("sps_pre_check", "PLC pre-check"),
    ("sps_address_in_send_db", "PLC address in send DB"),
    ("sps_address_in_receive_db", "PLC address in receive DB"),
    ("decision_criteria", "Decision criteria"),
    ("sequence_group", "Sequence group"),
    ("sequence", "Sequence"),
    ("always_perform", "Always perform"),
    ("q_gate_relevant", "Q-gate relevant"),
    ("template", "Template"),
    ("decision_class", "Decision class"),
    ("saving_class", "Saving class"),
    ("verification_class", "Verification class"),
    ("generation_class", "Generation class"),
    ("operation_decisions", "Operation decisions"),
    ("draft_conflicts.title", "Draft conflicts"),
    ("draft_conflicts.description", "The following fields were changed on the server while you had unsaved edits:"),
    ("draft_conflicts.none", "No draft conflicts."),
    ("draft_conflicts.dropped", "{count} draft(s) discarded because the entity was deleted."),
    ("version.entry", "Version {number} by {user} at {time}"),
];

const DE: &[(&str, &str)] = &[
    ("line", "Linie"),
    ("station", "Station"),
    ("tool", "Werkzeug"),
    ("operation", "Operation"),
    ("name", "Name"),
    ("comment", "Kommentar"),
    ("status_color", "Statusfarbe"),
    ("assembly_area", "Montagebereich"),
    ("description", "Beschreibung"),
    ("station_type", "Stationstyp"),
    ("serial_or_parallel", "Seriell oder parallel"),
    ("tool_class", "Werkzeugklasse"),
    ("tool_type", "Werkzeugtyp"),
    ("ip_address_device", "IP-Adresse (Gerät)"),
    ("sps_plc_name_spa_service", "SPS-Name (SPA-Service)"),
    ("sps_db_no_send", "SPS DB-Nr. Senden"),
    ("sps_db_no_receive", "SPS DB-Nr. Empfangen"),
    ("sps_pre_check", "SPS-Vorprüfung"),
    ("sps_address_in_send_db", "SPS-Adresse im Sende-DB"),
    ("sps_address_in_receive_db", "SPS-Adresse im Empfangs-DB"),
    ("decision_criteria", "Entscheidungskriterien"),
    ("sequence_group", "Sequenzgruppe"),
    ("sequence", "Sequenz"),
    ("always_perform", "Immer ausführen"),
    ("q_gate_relevant", "Q-Gate-relevant"),
    ("template", "Vorlage"),
    ("decision_class", "Entscheidungsklasse"),
    ("saving_class", "Speicherklasse"),
    ("verification_class", "Prüfklasse"),
    ("generation_class", "Generierungsklasse"),
    ("operation_decisions", "Operationsentscheidungen"),
    ("draft_conflicts.title", "Entwurfskonflikte"),
    ("draft_conflicts.description", "Folgende Felder wurden auf dem Server geändert, während Sie ungespeicherte Änderungen hatten:"),
    ("draft_conflicts.none", "Keine Entwurfskonflikte."),
    ("draft_conflicts.dropped", "{count} Entwurf/Entwürfe verworfen, da das Element gelöscht wurde."),
    ("version.entry", "Version {number} von {user} am {time}"),
];

fn table(locale: Locale) -> &'static [(&'static str, &'static str)] {
    match locale {
        Locale::En => EN,
        Locale::De => DE,
    }
}

/// Translate `key`, falling back to English and then to the key itself.
#[must_use]
pub fn translate<'a>(locale: Locale, key: &'a str) -> &'a str {
    lookup(table(locale), key).or_else(|| lookup(EN, key)).unwrap_or(key)
}

/// Every key/label pair for a locale, in table order.
#[must_use]
pub fn dictionary(locale: Locale) -> &'static [(&'static str, &'static str)] {
    table(locale)
}

fn lookup(table: &'static [(&'static str, &'static str)], key: &str) -> Option<&'static str> {
    table.iter().find(|(k, _)| *k == key).map(|(_, v)| *v)
}

#[cfg(test)]
#[path = "i18n_test.rs"]
mod tests;
