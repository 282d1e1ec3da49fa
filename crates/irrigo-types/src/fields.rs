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

//! Settings form field descriptions.
//!
//! Plugins describe their form in terms of these types and the web layer
//! renders them. The field key always matches an option key.

use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Choice {
    pub value: String,
    pub label: String,
}

impl Choice {
    pub fn new(value: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            label: label.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", content = "choices", rename_all = "snake_case")]
pub enum FieldKind {
    Checkbox,
    Integer,
    Decimal,
    Text,
    Password,
    /// Single choice, rendered as a select
    Choice(Vec<Choice>),
    /// Several choices, rendered as checkboxes sharing the key
    MultiChoice(Vec<Choice>),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldSpec {
    pub key: &'static str,
    pub label: String,
    pub kind: FieldKind,
    pub help: Option<String>,
}

impl FieldSpec {
    fn new(key: &'static str, label: impl Into<String>, kind: FieldKind) -> Self {
        Self {
            key,
            label: label.into(),
            kind,
            help: None,
        }
    }

    pub fn checkbox(key: &'static str, label: impl Into<String>) -> Self {
        Self::new(key, label, FieldKind::Checkbox)
    }

    pub fn integer(key: &'static str, label: impl Into<String>) -> Self {
        Self::new(key, label, FieldKind::Integer)
    }

    pub fn decimal(key: &'static str, label: impl Into<String>) -> Self {
        Self::new(key, label, FieldKind::Decimal)
    }

    pub fn text(key: &'static str, label: impl Into<String>) -> Self {
        Self::new(key, label, FieldKind::Text)
    }

    pub fn password(key: &'static str, label: impl Into<String>) -> Self {
        Self::new(key, label, FieldKind::Password)
    }

    pub fn choice(key: &'static str, label: impl Into<String>, choices: Vec<Choice>) -> Self {
        Self::new(key, label, FieldKind::Choice(choices))
    }

    pub fn multi_choice(key: &'static str, label: impl Into<String>, choices: Vec<Choice>) -> Self {
        Self::new(key, label, FieldKind::MultiChoice(choices))
    }

    #[must_use]
    pub fn with_help(mut self, help: impl Into<String>) -> Self {
        self.help = Some(help.into());
        self
    }
}
