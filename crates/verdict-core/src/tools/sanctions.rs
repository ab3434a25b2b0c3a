//! Sanctions and PEP screening against fixed reference sets.

use super::{required_str, SeveritySignal, Tool, ToolError};
use serde_json::{json, Value};

struct SanctionsEntry {
    name: &'static str,
    list: &'static str,
    reason: &'static str,
    severity: &'static str,
    added_date: &'static str,
}

const SANCTIONS_LIST: &[SanctionsEntry] = &[
    SanctionsEntry {
        name: "ahmed ivanov",
        list: "OFAC_SDN",
        reason: "Terrorist financing",
        severity: "CRITICAL",
        added_date: "2023-01-15",
    },
    SanctionsEntry {
        name: "shell corp ltd",
        list: "EU_SANCTIONS",
        reason: "Money laundering front company",
        severity: "CRITICAL",
        added_date: "2022-08-20",
    },
    SanctionsEntry {
        name: "ivan petrov",
        list: "UN_CONSOLIDATED",
        reason: "Arms trafficking",
        severity: "HIGH",
        added_date: "2021-03-10",
    },
    SanctionsEntry {
        name: "dark holdings llc",
        list: "OFAC_SDN",
        reason: "Sanctions evasion",
        severity: "CRITICAL",
        added_date: "2024-02-01",
    },
    SanctionsEntry {
        name: "maria gonzalez",
        list: "INTERPOL_RED",
        reason: "Financial fraud",
        severity: "HIGH",
        added_date: "2023-11-05",
    },
];

const CHECKED_LISTS: [&str; 4] = ["OFAC_SDN", "EU_SANCTIONS", "UN_CONSOLIDATED", "INTERPOL"];

struct PepEntry {
    name: &'static str,
    position: &'static str,
    country: &'static str,
    risk_level: &'static str,
    active: bool,
}

const PEP_LIST: &[PepEntry] = &[
    PepEntry {
        name: "john smith",
        position: "Former Minister of Finance",
        country: "Countryland",
        risk_level: "MEDIUM",
        active: false,
    },
    PepEntry {
        name: "elena volkova",
        position: "Current Deputy Governor",
        country: "Regionstan",
        risk_level: "HIGH",
        active: true,
    },
    PepEntry {
        name: "carlos rodriguez",
        position: "Former Central Bank Director",
        country: "Tropicalia",
        risk_level: "MEDIUM",
        active: false,
    },
];

/// Token-wise partial match: first and last tokens contain each other.
fn partial_match(query: &[&str], candidate: &[&str]) -> bool {
    if query.len() < 2 || candidate.len() < 2 {
        return false;
    }
    let overlaps = |a: &str, b: &str| a.contains(b) || b.contains(a);
    overlaps(query[0], candidate[0]) && overlaps(query[query.len() - 1], candidate[candidate.len() - 1])
}

fn title_case(name: &str) -> String {
    name.split_whitespace()
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<String>>()
        .join(" ")
}

pub struct SanctionsListTool;

impl SanctionsListTool {
    pub fn screen(entity_name: &str) -> Value {
        let normalized = entity_name.trim().to_lowercase();

        if let Some(entry) = SANCTIONS_LIST.iter().find(|e| e.name == normalized) {
            return json!({
                "is_sanctioned": true,
                "entity_name": entity_name,
                "sanctions_list": entry.list,
                "reason": entry.reason,
                "severity": entry.severity,
                "added_date": entry.added_date,
                "recommendation": "BLOCK_TRANSACTION",
            });
        }

        let query: Vec<&str> = normalized.split_whitespace().collect();
        for entry in SANCTIONS_LIST {
            let candidate: Vec<&str> = entry.name.split_whitespace().collect();
            if partial_match(&query, &candidate) {
                return json!({
                    "is_sanctioned": true,
                    "entity_name": entity_name,
                    "matched_name": title_case(entry.name),
                    "match_type": "PARTIAL",
                    "sanctions_list": entry.list,
                    "reason": entry.reason,
                    "severity": entry.severity,
                    "recommendation": "MANUAL_REVIEW",
                });
            }
        }

        json!({
            "is_sanctioned": false,
            "entity_name": entity_name,
            "status": "CLEAN",
            "checked_lists": CHECKED_LISTS,
            "recommendation": "PROCEED",
        })
    }
}

impl Tool for SanctionsListTool {
    fn name(&self) -> &'static str {
        "check_sanctions_list"
    }

    fn description(&self) -> &'static str {
        "Checks whether a person or company appears on global sanctions lists \
         (OFAC, EU, UN, Interpol). Use this for every counterparty named in the input."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "entity_name": {
                    "type": "string",
                    "description": "Full name of the person or company to check"
                }
            },
            "required": ["entity_name"]
        })
    }

    fn execute(&self, args: &Value) -> Result<Value, ToolError> {
        let entity_name = required_str(self.name(), args, "entity_name")?;
        Ok(Self::screen(entity_name))
    }

    fn severity(&self, output: &Value) -> Option<SeveritySignal> {
        if output["is_sanctioned"].as_bool() != Some(true) {
            return None;
        }
        let factor = if output["match_type"] == "PARTIAL" {
            "SANCTIONS_PARTIAL_MATCH"
        } else {
            "SANCTIONS_MATCH"
        };
        match output["severity"].as_str() {
            Some("CRITICAL") => Some(SeveritySignal::new(90, factor)),
            Some("HIGH") => Some(SeveritySignal::new(70, factor)),
            _ => Some(SeveritySignal::new(60, factor)),
        }
    }
}

pub struct PepStatusTool;

impl PepStatusTool {
    pub fn screen(person_name: &str) -> Value {
        let normalized = person_name.trim().to_lowercase();

        match PEP_LIST.iter().find(|e| e.name == normalized) {
            Some(entry) => json!({
                "is_pep": true,
                "person_name": person_name,
                "position": entry.position,
                "country": entry.country,
                "risk_level": entry.risk_level,
                "currently_active": entry.active,
                "recommendation": "ENHANCED_DUE_DILIGENCE",
            }),
            None => json!({
                "is_pep": false,
                "person_name": person_name,
                "status": "NOT_PEP",
                "recommendation": "STANDARD_PROCESSING",
            }),
        }
    }
}

impl Tool for PepStatusTool {
    fn name(&self) -> &'static str {
        "check_pep_status"
    }

    fn description(&self) -> &'static str {
        "Checks whether a person is a Politically Exposed Person (PEP). \
         PEPs require enhanced due diligence."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "person_name": {
                    "type": "string",
                    "description": "Full name of the person to check"
                }
            },
            "required": ["person_name"]
        })
    }

    fn execute(&self, args: &Value) -> Result<Value, ToolError> {
        let person_name = required_str(self.name(), args, "person_name")?;
        Ok(Self::screen(person_name))
    }

    fn severity(&self, output: &Value) -> Option<SeveritySignal> {
        if output["is_pep"].as_bool() != Some(true) {
            return None;
        }
        match output["risk_level"].as_str() {
            Some("HIGH") => Some(SeveritySignal::new(65, "PEP_EXPOSURE")),
            _ => Some(SeveritySignal::new(40, "PEP_EXPOSURE")),
        }
    }
}
