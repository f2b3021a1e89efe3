#![allow(dead_code)]

use attio_tools::app::ports::Prompter;
use attio_tools::error::{CrmError, Result};
use attio_tools::types::{FieldValue, Record};
use chrono::{TimeZone, Utc};
use std::collections::VecDeque;
use std::sync::Mutex;

/// Answers prompts from a fixed script, in order
pub struct ScriptedPrompter {
    answers: Mutex<VecDeque<String>>,
}

impl ScriptedPrompter {
    pub fn new(answers: &[&str]) -> Self {
        Self {
            answers: Mutex::new(answers.iter().map(|a| a.to_string()).collect()),
        }
    }

    fn next(&self, question: &str) -> Result<String> {
        self.answers
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| CrmError::Prompt(format!("no scripted answer for '{question}'")))
    }

    pub fn remaining(&self) -> usize {
        self.answers.lock().unwrap().len()
    }
}

impl Prompter for ScriptedPrompter {
    fn confirm(&self, question: &str, _default: bool) -> Result<bool> {
        Ok(self.next(question)? == "y")
    }

    fn ask(&self, question: &str, default: Option<&str>) -> Result<String> {
        let answer = self.next(question)?;
        if answer.is_empty() {
            Ok(default.unwrap_or_default().to_string())
        } else {
            Ok(answer)
        }
    }

    fn choose(&self, question: &str, _choices: &[String], _default: usize) -> Result<usize> {
        self.next(question)?
            .parse()
            .map_err(|_| CrmError::Prompt(format!("scripted choice for '{question}' is not an index")))
    }
}

pub fn company(id: &str, name: &str, created_secs: i64, domains: &[&str]) -> Record {
    Record::new(id, "companies")
        .created(Utc.timestamp_opt(created_secs, 0).unwrap())
        .with_value("name", FieldValue::Text(name.to_string()))
        .with_value(
            "domains",
            FieldValue::List(domains.iter().map(|d| d.to_string()).collect()),
        )
}

pub fn person(id: &str, name: &str, created_secs: i64, email: &str) -> Record {
    Record::new(id, "people")
        .created(Utc.timestamp_opt(created_secs, 0).unwrap())
        .with_value("name", FieldValue::Text(name.to_string()))
        .with_value("email_addresses", FieldValue::List(vec![email.to_string()]))
}
