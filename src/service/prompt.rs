//! Prompt assembly for reply drafting and conversation interpretation.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use strum::{AsRefStr, Display};

use crate::database::org_profile::OrgProfile;
use crate::database::persona_config::PersonaConfig;
use crate::database::services_catalog::ServiceCatalog;
use crate::service::gateway::{GatewayEvent, GatewayTicket};
use crate::service::settings::RuntimeSettings;
use crate::utils::sla::extract_name;

const MISSING: &str = "N/D";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, AsRefStr)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum MessageType {
    PrimeraRespuesta,
    Actualizacion,
    Cierre,
}

fn is_present(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
        _ => true,
    }
}

fn json_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Array elements joined by `sep`; any other value as its string form.
fn join_json(value: &Value, sep: &str) -> String {
    match value {
        Value::Array(items) => items.iter().map(json_text).collect::<Vec<_>>().join(sep),
        other => json_text(other),
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|s| !s.is_empty())
}

pub fn build_system_prompt(persona: &PersonaConfig, org: &OrgProfile) -> String {
    let mut parts: Vec<String> = Vec::new();
    if let Some(template) = non_empty(&persona.system_prompt_template) {
        parts.push(template.trim().to_string());
    } else {
        if let Some(role) = non_empty(&persona.role_description) {
            parts.push(format!("Rol: {}", role));
        }
        if let Some(tones) = persona.tone_attributes.as_ref().filter(|v| is_present(v)) {
            parts.push(format!("Tono: {}", join_json(tones, ", ")));
        }
        if let Some(rules) = persona.rules.as_ref().filter(|v| is_present(v)) {
            parts.push(format!("Reglas: {}", join_json(rules, "; ")));
        }
    }

    if let Some(industry) = non_empty(&org.industry) {
        parts.push(format!("Industria: {}", industry));
    }
    if let Some(context) = non_empty(&org.context) {
        parts.push(format!("Contexto organización: {}", context));
    }
    if let Some(tone_notes) = non_empty(&org.tone_notes) {
        parts.push(format!("Notas de tono: {}", tone_notes));
    }
    if let Some(services) = org.critical_services.as_ref().filter(|v| is_present(v)) {
        parts.push(format!("Servicios críticos: {}", join_json(services, ", ")));
    }
    parts.push("Responde siempre en español y sé conciso.".to_string());
    parts.join("\n")
}

/// Last `limit` items. A limit of zero or less keeps everything.
fn tail<T>(items: &[T], limit: i64) -> &[T] {
    match usize::try_from(limit) {
        Ok(n) if n > 0 && n < items.len() => &items[items.len() - n..],
        _ => items,
    }
}

fn or_blank(value: &Option<String>) -> &str {
    value.as_deref().unwrap_or("")
}

pub fn format_history(events: &[GatewayEvent], limit: i64) -> String {
    tail(events, limit)
        .iter()
        .map(|ev| {
            format!(
                "[{}] ({}/{}) {}: {}",
                or_blank(&ev.timestamp),
                or_blank(&ev.visibility),
                or_blank(&ev.author_type),
                or_blank(&ev.author_name),
                or_blank(&ev.text)
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn format_internal_notes(events: &[GatewayEvent], limit: i64) -> String {
    let internal: Vec<&GatewayEvent> = events
        .iter()
        .filter(|ev| ev.visibility.as_deref().unwrap_or("").to_lowercase() == "interno")
        .collect();
    tail(&internal, limit)
        .iter()
        .map(|ev| {
            format!(
                "[{}] {}: {}",
                or_blank(&ev.timestamp),
                or_blank(&ev.author_name),
                or_blank(&ev.text)
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn name_or_missing(value: &Option<Value>) -> String {
    extract_name(value.as_ref()).unwrap_or_else(|| MISSING.to_string())
}

fn text_or_missing(value: &Option<String>) -> &str {
    non_empty(value).unwrap_or(MISSING)
}

fn ticket_header(detail: &GatewayTicket) -> String {
    format!(
        "Ticket: {} / {}\nAsunto: {}\nEstado: {} | Prioridad: {}\n",
        text_or_missing(&detail.id),
        text_or_missing(&detail.display_id),
        text_or_missing(&detail.subject),
        name_or_missing(&detail.status),
        name_or_missing(&detail.priority),
    )
}

pub fn build_reply_prompt(
    detail: &GatewayTicket,
    history: &[GatewayEvent],
    service: Option<&ServiceCatalog>,
    settings: &RuntimeSettings,
    message_type: MessageType,
    draft: Option<&str>,
) -> String {
    let service_line = match service {
        Some(service) => format!("{} (code {})", service.name, service.service_code),
        None => text_or_missing(&detail.service_code).to_string(),
    };
    let requester_name = detail.requester_display_name().unwrap_or_else(|| MISSING.to_string());
    let requester_email = detail.requester_email().unwrap_or_else(|| MISSING.to_string());
    let draft = draft.filter(|d| !d.trim().is_empty()).unwrap_or("N/A");

    format!(
        "Tipo de mensaje: {}\n{}Servicio: {}\nSolicitante: {} ({})\nCreado: {}\nÚltimo contacto usuario: {}\nDescripción: {}\nHistorial reciente:\n{}\nNotas internas recientes:\n{}\nBorrador del técnico (si hay): {}\nEntrega una sola respuesta sugerida y accionable, breve, en español.",
        message_type,
        ticket_header(detail),
        service_line,
        requester_name,
        requester_email,
        text_or_missing(&detail.created_time),
        detail.last_contact().filter(|s| !s.is_empty()).unwrap_or(MISSING),
        text_or_missing(&detail.description),
        format_history(history, settings.max_history_messages()),
        format_internal_notes(history, settings.max_internal_notes()),
        draft,
    )
}

pub fn build_interpret_prompt(
    detail: &GatewayTicket,
    history: &[GatewayEvent],
    settings: &RuntimeSettings,
) -> String {
    format!(
        "Analiza el historial del ticket y sugiere enfoque/acción próxima.\n{}Historial reciente:\n{}\nDevuelve solo una sugerencia breve (no redactes el mensaje final).",
        ticket_header(detail),
        format_history(history, settings.max_history_messages()),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::HashMap;

    fn event(visibility: &str, author: &str, text: &str) -> GatewayEvent {
        GatewayEvent {
            visibility: Some(visibility.to_string()),
            author_type: Some("tecnico".to_string()),
            author_name: Some(author.to_string()),
            timestamp: Some("2025-03-08T10:00:00Z".to_string()),
            text: Some(text.to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_system_prompt_from_persona_fields() {
        let persona = PersonaConfig {
            role_description: Some("Analista de mesa".to_string()),
            tone_attributes: Some(json!(["cordial", "claro"])),
            rules: Some(json!(["no prometer plazos", "usar usted"])),
            ..Default::default()
        };
        let org = OrgProfile {
            industry: Some("Retail".to_string()),
            critical_services: Some(json!(["POS"])),
            ..Default::default()
        };
        assert_eq!(
            build_system_prompt(&persona, &org),
            "Rol: Analista de mesa\nTono: cordial, claro\nReglas: no prometer plazos; usar usted\nIndustria: Retail\nServicios críticos: POS\nResponde siempre en español y sé conciso."
        );
    }

    #[test]
    fn test_template_replaces_persona_fields() {
        let persona = PersonaConfig {
            system_prompt_template: Some("  Eres un asistente.  ".to_string()),
            role_description: Some("ignored".to_string()),
            rules: Some(json!("una sola regla")),
            ..Default::default()
        };
        let prompt = build_system_prompt(&persona, &OrgProfile::default());
        assert_eq!(prompt, "Eres un asistente.\nResponde siempre en español y sé conciso.");
    }

    #[test]
    fn test_scalar_tone_uses_string_form() {
        let persona = PersonaConfig {
            tone_attributes: Some(json!("formal")),
            rules: Some(json!([])),
            ..Default::default()
        };
        let prompt = build_system_prompt(&persona, &OrgProfile::default());
        assert!(prompt.starts_with("Tono: formal\nResponde"));
    }

    #[test]
    fn test_history_limits() {
        let events = vec![
            event("publico", "Ana", "uno"),
            event("interno", "Luis", "nota 1"),
            event("publico", "Ana", "dos"),
            event("Interno", "Luis", "nota 2"),
        ];
        let history = format_history(&events, 2);
        assert_eq!(history.lines().count(), 2);
        assert!(history.starts_with("[2025-03-08T10:00:00Z] (publico/tecnico) Ana: dos"));
        assert_eq!(format_history(&events, 0).lines().count(), 4);
        assert_eq!(format_history(&events, -1).lines().count(), 4);

        let notes = format_internal_notes(&events, 1);
        assert_eq!(notes, "[2025-03-08T10:00:00Z] Luis: nota 2");
        assert_eq!(format_internal_notes(&events, 5).lines().count(), 2);
    }

    #[test]
    fn test_reply_prompt_lines() {
        let detail = GatewayTicket {
            id: Some("10".to_string()),
            display_id: Some("REQ-10".to_string()),
            subject: Some("Sin VPN".to_string()),
            status: Some(json!({"name": "Abierto"})),
            priority: Some(json!("P2")),
            service_code: Some("NET".to_string()),
            requester: Some(json!({"name": "Marta", "email_id": "marta@contoso.com"})),
            ..Default::default()
        };
        let settings = RuntimeSettings::new(HashMap::new());
        let prompt = build_reply_prompt(
            &detail,
            &[event("interno", "Luis", "revisar firewall")],
            None,
            &settings,
            MessageType::PrimeraRespuesta,
            None,
        );
        let lines: Vec<&str> = prompt.lines().collect();
        assert_eq!(lines[0], "Tipo de mensaje: primera_respuesta");
        assert_eq!(lines[1], "Ticket: 10 / REQ-10");
        assert_eq!(lines[2], "Asunto: Sin VPN");
        assert_eq!(lines[3], "Estado: Abierto | Prioridad: P2");
        assert_eq!(lines[4], "Servicio: NET");
        assert_eq!(lines[5], "Solicitante: Marta (marta@contoso.com)");
        assert!(prompt.contains("Borrador del técnico (si hay): N/A"));
        assert!(prompt.contains("Notas internas recientes:\n[2025-03-08T10:00:00Z] Luis: revisar firewall"));

        let service = ServiceCatalog {
            service_code: "NET".to_string(),
            name: "Red".to_string(),
            ..Default::default()
        };
        let prompt = build_reply_prompt(
            &detail,
            &[],
            Some(&service),
            &settings,
            MessageType::Cierre,
            Some("ya quedó"),
        );
        assert!(prompt.contains("Servicio: Red (code NET)"));
        assert!(prompt.contains("Borrador del técnico (si hay): ya quedó"));
    }

    #[test]
    fn test_interpret_prompt_frame() {
        let prompt = build_interpret_prompt(
            &GatewayTicket::default(),
            &[],
            &RuntimeSettings::default(),
        );
        assert!(prompt.starts_with("Analiza el historial del ticket"));
        assert!(prompt.ends_with("Devuelve solo una sugerencia breve (no redactes el mensaje final)."));
    }

    #[test]
    fn test_message_type_wire_names() {
        assert_eq!(MessageType::Actualizacion.as_ref(), "actualizacion");
        let parsed: MessageType = serde_json::from_value(json!("primera_respuesta")).unwrap();
        assert_eq!(parsed, MessageType::PrimeraRespuesta);
        assert!(serde_json::from_value::<MessageType>(json!("saludo")).is_err());
    }
}
