// Copyright (c) 2025 SOLARE S.R.O.
//
// This file is part of Irrigo.
//
// Licensed under the Creative Commons Attribution-NonCommercial-NoDerivatives 4.0 International
// (CC BY-NC-ND 4.0). You may use and share this file for non-commercial purposes only and you may not
// create derivatives. See <https://creativecommons.org/licenses/by-nc-nd/4.0/>.
//
// This software is provided "AS IS", without warranty of any kind.
//
// For commercial licensing, please contact: info@solare.cz

//! Askama templates and the flattened view models they render.

use askama::Template;
use chrono::{DateTime, Local, TimeZone};
use irrigo_core::{PageAction, RegistersSnapshot, WorkerStatus};
use irrigo_types::{Choice, FieldKind, FieldSpec, LogEntry, OptionValue};

const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

fn format_time<Tz: TimeZone>(time: &DateTime<Tz>) -> String {
    time.with_timezone(&Local).format(TIME_FORMAT).to_string()
}

#[derive(Debug, Clone)]
pub struct PluginRow {
    pub name: String,
    pub slug: String,
    pub state: &'static str,
    pub last_outcome: String,
    pub next_run: String,
}

impl PluginRow {
    pub fn new(name: &str, slug: &str, has_worker: bool, status: Option<&WorkerStatus>) -> Self {
        let state = match status {
            Some(s) if s.running => "running",
            Some(_) => "stopped",
            None if has_worker => "stopped",
            None => "page",
        };
        Self {
            name: name.to_owned(),
            slug: slug.to_owned(),
            state,
            last_outcome: status
                .and_then(|s| s.last_outcome.as_ref())
                .map(|o| o.label().to_owned())
                .unwrap_or_default(),
            next_run: status
                .and_then(|s| s.next_run_at.as_ref())
                .map(format_time)
                .unwrap_or_default(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RegisterRow {
    pub plugin: String,
    pub value: String,
}

#[derive(Template, Debug)]
#[template(path = "index.html")]
pub struct IndexTemplate {
    pub system_name: String,
    pub plugins: Vec<PluginRow>,
    pub rain_blocks: Vec<RegisterRow>,
    pub level_adjustments: Vec<RegisterRow>,
}

impl IndexTemplate {
    pub fn new(system_name: String, plugins: Vec<PluginRow>, registers: &RegistersSnapshot) -> Self {
        Self {
            system_name,
            plugins,
            rain_blocks: registers
                .rain_blocks
                .iter()
                .map(|(plugin, until)| RegisterRow {
                    plugin: plugin.clone(),
                    value: format_time(until),
                })
                .collect(),
            level_adjustments: registers
                .level_adjustments
                .iter()
                .map(|(plugin, level)| RegisterRow {
                    plugin: plugin.clone(),
                    value: format!("{:.0}%", level * 100.0),
                })
                .collect(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ChoiceView {
    pub value: String,
    pub label: String,
    pub selected: bool,
}

/// One form input, already resolved against the current option value
#[derive(Debug, Clone)]
pub struct FieldView {
    pub key: String,
    pub label: String,
    pub help: String,
    /// checkbox, number, text, password, select or multi
    pub input: &'static str,
    pub step: &'static str,
    pub value: String,
    pub checked: bool,
    pub choices: Vec<ChoiceView>,
}

fn choice_views(choices: &[Choice], selected: impl Fn(&str) -> bool) -> Vec<ChoiceView> {
    choices
        .iter()
        .map(|c| ChoiceView {
            value: c.value.clone(),
            label: c.label.clone(),
            selected: selected(&c.value),
        })
        .collect()
}

impl FieldView {
    pub fn new(spec: &FieldSpec, value: Option<&OptionValue>) -> Self {
        let text = value.map(ToString::to_string).unwrap_or_default();
        let (input, step, choices) = match &spec.kind {
            FieldKind::Checkbox => ("checkbox", "", Vec::new()),
            FieldKind::Integer => ("number", "1", Vec::new()),
            FieldKind::Decimal => ("number", "any", Vec::new()),
            FieldKind::Text => ("text", "", Vec::new()),
            FieldKind::Password => ("password", "", Vec::new()),
            FieldKind::Choice(choices) => ("select", "", choice_views(choices, |v| v == text)),
            FieldKind::MultiChoice(choices) => {
                let list = value.and_then(OptionValue::as_list).unwrap_or_default();
                (
                    "multi",
                    "",
                    choice_views(choices, |v| {
                        v.parse::<i64>().is_ok_and(|n| list.contains(&n))
                    }),
                )
            }
        };

        Self {
            key: spec.key.to_owned(),
            label: spec.label.clone(),
            help: spec.help.clone().unwrap_or_default(),
            input,
            step,
            checked: value.and_then(OptionValue::as_bool).unwrap_or(false),
            value: text,
            choices,
        }
    }
}

#[derive(Debug, Clone)]
pub struct EventView {
    pub time: String,
    pub severity: String,
    pub message: String,
}

impl From<&LogEntry> for EventView {
    fn from(entry: &LogEntry) -> Self {
        Self {
            time: format_time(&entry.timestamp),
            severity: entry.severity.to_string(),
            message: entry.message.clone(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ActionView {
    pub id: String,
    pub label: String,
}

impl From<&PageAction> for ActionView {
    fn from(action: &PageAction) -> Self {
        Self {
            id: action.id.to_owned(),
            label: action.label.clone(),
        }
    }
}

#[derive(Template, Debug)]
#[template(path = "settings.html")]
pub struct SettingsTemplate {
    pub system_name: String,
    pub name: String,
    pub slug: String,
    pub fields: Vec<FieldView>,
    pub status: Vec<String>,
    pub events: Vec<EventView>,
    pub actions: Vec<ActionView>,
}

#[derive(Template, Debug)]
#[template(path = "restarting.html")]
pub struct RestartingTemplate {
    pub system_name: String,
    pub return_to: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_multi_choice_selection() {
        let spec = FieldSpec::multi_choice(
            "protect_months",
            "Months",
            vec![Choice::new("1", "January"), Choice::new("2", "February")],
        );
        let view = FieldView::new(&spec, Some(&OptionValue::List(vec![2])));

        assert_eq!(view.input, "multi");
        assert!(!view.choices[0].selected);
        assert!(view.choices[1].selected);
    }

    #[test]
    fn test_checkbox_state() {
        let spec = FieldSpec::checkbox("enabled", "Enabled");
        assert!(FieldView::new(&spec, Some(&OptionValue::Bool(true))).checked);
        assert!(!FieldView::new(&spec, None).checked);
    }

    #[test]
    fn test_settings_page_escapes_messages() {
        let page = SettingsTemplate {
            system_name: "Garden".to_owned(),
            name: "Rain".to_owned(),
            slug: "rain".to_owned(),
            fields: vec![FieldView::new(
                &FieldSpec::checkbox("enabled", "Enabled"),
                Some(&OptionValue::Bool(true)),
            )],
            status: Vec::new(),
            events: vec![EventView {
                time: "2025-06-01 10:00:00".to_owned(),
                severity: "INFO".to_owned(),
                message: "<b>rain</b>".to_owned(),
            }],
            actions: Vec::new(),
        };

        let html = page.render().unwrap();

        assert!(html.contains("&lt;b&gt;rain&lt;/b&gt;"));
        assert!(html.contains(r#"<input type="hidden" name="enabled" value="off">"#));
    }
}
