use crate::app::ports::Prompter;
use crate::error::{CrmError, Result};
use std::io::{self, BufRead, Write};

/// Prompts on stdout and reads answers from stdin
pub struct StdinPrompter;

impl StdinPrompter {
    fn read_line(prompt: &str) -> Result<String> {
        print!("{prompt}");
        io::stdout().flush()?;
        let mut input = String::new();
        let read = io::stdin().lock().read_line(&mut input)?;
        if read == 0 {
            return Err(CrmError::Prompt("stdin closed".to_string()));
        }
        Ok(input.trim().to_string())
    }
}

/// `y`/`yes`/`n`/`no` in any case; empty picks the default; anything else is `None`.
pub fn parse_yes_no(input: &str, default: bool) -> Option<bool> {
    match input.trim().to_lowercase().as_str() {
        "" => Some(default),
        "y" | "yes" => Some(true),
        "n" | "no" => Some(false),
        _ => None,
    }
}

/// A 1-based number or the exact text of a choice.
pub fn parse_choice(input: &str, choices: &[String], default: usize) -> Option<usize> {
    let input = input.trim();
    if input.is_empty() {
        return Some(default);
    }
    if let Ok(n) = input.parse::<usize>() {
        return (1..=choices.len()).contains(&n).then(|| n - 1);
    }
    choices.iter().position(|c| c.eq_ignore_ascii_case(input))
}

impl Prompter for StdinPrompter {
    fn confirm(&self, question: &str, default: bool) -> Result<bool> {
        let hint = if default { "[Y/n]" } else { "[y/N]" };
        loop {
            let answer = Self::read_line(&format!("{question} {hint} "))?;
            match parse_yes_no(&answer, default) {
                Some(value) => return Ok(value),
                None => println!("Please answer y or n."),
            }
        }
    }

    fn ask(&self, question: &str, default: Option<&str>) -> Result<String> {
        let prompt = match default {
            Some(d) => format!("{question} ({d}): "),
            None => format!("{question}: "),
        };
        let answer = Self::read_line(&prompt)?;
        if answer.is_empty() {
            Ok(default.unwrap_or_default().to_string())
        } else {
            Ok(answer)
        }
    }

    fn choose(&self, question: &str, choices: &[String], default: usize) -> Result<usize> {
        if choices.is_empty() {
            return Err(CrmError::Prompt(format!("no choices offered for '{question}'")));
        }
        println!("{question}");
        for (i, choice) in choices.iter().enumerate() {
            let marker = if i == default { " (default)" } else { "" };
            println!("  {}. {}{}", i + 1, choice, marker);
        }
        loop {
            let answer = Self::read_line("> ")?;
            match parse_choice(&answer, choices, default) {
                Some(index) => return Ok(index),
                None => println!("Pick a number between 1 and {}.", choices.len()),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_yes_no() {
        assert_eq!(parse_yes_no("Y", false), Some(true));
        assert_eq!(parse_yes_no("no", true), Some(false));
        assert_eq!(parse_yes_no("", true), Some(true));
        assert_eq!(parse_yes_no("maybe", true), None);
    }

    #[test]
    fn test_parse_choice() {
        let choices = vec!["Migrate all".to_string(), "Filter by field".to_string()];
        assert_eq!(parse_choice("", &choices, 0), Some(0));
        assert_eq!(parse_choice("2", &choices, 0), Some(1));
        assert_eq!(parse_choice("filter by field", &choices, 0), Some(1));
        assert_eq!(parse_choice("3", &choices, 0), None);
        assert_eq!(parse_choice("0", &choices, 0), None);
    }
}
