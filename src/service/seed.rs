//! Startup seed: a YAML file with technician mappings, catalog entries,
//! persona, org profile and settings, applied through the model upserts.

use std::collections::BTreeMap;
use std::{fs, path::Path};

use cyder_tools::log::info;
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

use crate::controller::BaseError;
use crate::database::org_profile::OrgProfile;
use crate::database::persona_config::PersonaConfig;
use crate::database::services_catalog::ServiceCatalog;
use crate::database::setting::Setting;
use crate::database::technician_mapping::TechnicianMapping;
use crate::database::DbPool;

#[derive(Debug, Error)]
pub enum SeedError {
    #[error("failed to read seed file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse seed file: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("failed to apply seed: {0}")]
    Apply(#[from] BaseError),
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SeedTechnician {
    pub user_upn: String,
    pub technician_id_sdp: String,
    #[serde(default = "default_true")]
    pub active: bool,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SeedService {
    pub service_code: String,
    pub name: String,
    pub short_description: Option<String>,
    pub requirements: Option<String>,
    pub first_response_notes: Option<String>,
    pub update_notes: Option<String>,
    pub closure_notes: Option<String>,
    pub comm_sla_p1_hours: Option<f64>,
    pub comm_sla_p2_hours: Option<f64>,
    pub comm_sla_p3_hours: Option<f64>,
    pub comm_sla_p4_hours: Option<f64>,
    pub sdp_mapping_info: Option<Value>,
}

impl From<SeedService> for ServiceCatalog {
    fn from(s: SeedService) -> Self {
        ServiceCatalog {
            service_code: s.service_code,
            name: s.name,
            short_description: s.short_description,
            requirements: s.requirements,
            first_response_notes: s.first_response_notes,
            update_notes: s.update_notes,
            closure_notes: s.closure_notes,
            comm_sla_p1_hours: s.comm_sla_p1_hours,
            comm_sla_p2_hours: s.comm_sla_p2_hours,
            comm_sla_p3_hours: s.comm_sla_p3_hours,
            comm_sla_p4_hours: s.comm_sla_p4_hours,
            sdp_mapping_info: s.sdp_mapping_info,
            ..Default::default()
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SeedPersona {
    pub role_description: Option<String>,
    pub tone_attributes: Option<Value>,
    pub rules: Option<Value>,
    pub max_reply_length: Option<i32>,
    pub system_prompt_template: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SeedOrgProfile {
    pub industry: Option<String>,
    pub context: Option<String>,
    pub critical_services: Option<Value>,
    pub tone_notes: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SeedData {
    #[serde(default)]
    pub technicians: Vec<SeedTechnician>,
    #[serde(default)]
    pub services: Vec<SeedService>,
    pub persona: Option<SeedPersona>,
    pub org_profile: Option<SeedOrgProfile>,
    #[serde(default)]
    pub settings: BTreeMap<String, Value>,
}

impl SeedData {
    pub fn from_yaml(source: &str) -> Result<Self, SeedError> {
        Ok(serde_yaml::from_str(source)?)
    }

    pub fn from_file(path: &Path) -> Result<Self, SeedError> {
        let source = fs::read_to_string(path).map_err(|source| SeedError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_yaml(&source)
    }

    /// Mappings, catalog entries and settings are upserted by key. The org
    /// profile is replaced. The persona is only created when no active one
    /// exists, so restarts do not stack duplicates.
    pub fn apply(self, pool: &DbPool) -> Result<(), SeedError> {
        for t in &self.technicians {
            TechnicianMapping::upsert(pool, &t.user_upn, &t.technician_id_sdp, t.active)?;
        }
        let services = self.services.len();
        for service in self.services {
            ServiceCatalog::upsert(pool, &service.into())?;
        }
        if let Some(persona) = self.persona {
            if PersonaConfig::get_active(pool)?.is_none() {
                PersonaConfig::create(
                    pool,
                    &PersonaConfig {
                        role_description: persona.role_description,
                        tone_attributes: persona.tone_attributes,
                        rules: persona.rules,
                        max_reply_length: persona.max_reply_length,
                        system_prompt_template: persona.system_prompt_template,
                        active: true,
                        ..Default::default()
                    },
                )?;
            }
        }
        if let Some(org) = self.org_profile {
            OrgProfile::save(
                pool,
                &OrgProfile {
                    industry: org.industry,
                    context: org.context,
                    critical_services: org.critical_services,
                    tone_notes: org.tone_notes,
                    ..Default::default()
                },
            )?;
        }
        for (key, value) in &self.settings {
            Setting::upsert(pool, key, value)?;
        }
        info!(
            "seed applied: {} technician(s), {} service(s), {} setting(s)",
            self.technicians.len(),
            services,
            self.settings.len()
        );
        Ok(())
    }
}
