//! Per-service payload formatters.
//!
//! Each formatter is a pure transform from an inbound webhook payload
//! (plus request headers) to a markdown `body` field, selected by the
//! `formatter` query parameter. Malformed payloads never panic: missing
//! fields degrade to omitting the corresponding fragment or to a
//! generic body, and a non-object payload is left untouched.

use std::fmt;
use std::str::FromStr;

use axum::http::HeaderMap;
use regex::Regex;
use serde_json::Value;
use thiserror::Error;

/// The `formatter` query parameter named a service we do not know.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown formatter: {0}")]
pub struct UnknownFormatter(String);

/// Payload formatter for a webhook-producing service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Formatter {
    /// Grafana legacy alert notifications.
    Grafana,
    /// Grafana 9.x unified alerting notifications.
    Grafana9,
    /// GitHub event deliveries.
    Github,
    /// GitLab notifications preformatted for Google Chat.
    GitlabGchat,
    /// GitLab notifications preformatted for Microsoft Teams.
    GitlabTeams,
}

impl FromStr for Formatter {
    type Err = UnknownFormatter;

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        match name {
            "grafana" => Ok(Self::Grafana),
            "grafana9" => Ok(Self::Grafana9),
            "github" => Ok(Self::Github),
            "gitlab_gchat" => Ok(Self::GitlabGchat),
            "gitlab_teams" => Ok(Self::GitlabTeams),
            other => Err(UnknownFormatter(other.to_string())),
        }
    }
}

impl fmt::Display for Formatter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Grafana => "grafana",
            Self::Grafana9 => "grafana9",
            Self::Github => "github",
            Self::GitlabGchat => "gitlab_gchat",
            Self::GitlabTeams => "gitlab_teams",
        };
        f.write_str(name)
    }
}

impl Formatter {
    /// Rewrite the payload's `body` field in place.
    pub fn apply(self, data: &mut Value, headers: &HeaderMap) {
        match self {
            Self::Grafana => grafana(data),
            Self::Grafana9 => grafana9(data),
            Self::Github => github(data, headers),
            Self::GitlabGchat => gitlab_gchat(data),
            Self::GitlabTeams => gitlab_teams(data),
        }
    }
}

/// Set `body` on an object payload; anything else is left untouched.
fn set_body(data: &mut Value, body: String) {
    if let Value::Object(map) = data {
        map.insert("body".to_string(), Value::String(body));
    }
}

fn text_field<'a>(data: &'a Value, field: &str) -> Option<&'a str> {
    data.get(field).and_then(Value::as_str)
}

/// Pretty-print a Grafana notification.
fn grafana(data: &mut Value) {
    let mut text = String::new();

    if let Some(title) = text_field(data, "title") {
        text.push_str("#### ");
        text.push_str(title);
        text.push('\n');
    }
    if let Some(message) = text_field(data, "message") {
        text.push_str(message);
        text.push_str("\n\n");
    }
    if let Some(matches) = data.get("evalMatches").and_then(Value::as_array) {
        for entry in matches {
            let metric = entry.get("metric").and_then(Value::as_str).unwrap_or("");
            let value = entry.get("value").map(Value::to_string).unwrap_or_default();
            text.push_str(&format!("* {metric}: {value}\n"));
        }
    }

    set_body(data, text);
}

/// The parenthesized suffix of an alert title, when non-empty.
fn parenthesized(title: &str) -> Option<&str> {
    let start = title.find('(')?;
    let rest = &title[start + 1..];
    let inner = &rest[..rest.find(')')?];
    (!inner.is_empty()).then_some(inner)
}

/// Pretty-print a Grafana 9.x notification.
fn grafana9(data: &mut Value) {
    let icon = match text_field(data, "state") {
        Some("alerting") => "💔",
        Some("nodata") => "❌",
        _ => "💚",
    };

    let mut text = String::new();
    if let Some(title) = text_field(data, "title") {
        let headline = parenthesized(title).unwrap_or(title);
        text.push_str(&format!("####{icon} {headline} {icon}\n"));
    }
    if let Some(message) = text_field(data, "message") {
        text.push_str(&format!("```md\n{message}\n```\n\n"));
    }

    set_body(data, text);
}

/// Pretty-print a GitHub notification.
fn github(data: &mut Value, headers: &HeaderMap) {
    let event = headers.get("x-github-event").and_then(|value| value.to_str().ok());
    if event != Some("push") {
        set_body(data, "notification from github".to_string());
        return;
    }

    let pusher = data
        .pointer("/pusher/name")
        .and_then(Value::as_str)
        .unwrap_or("unknown");
    let reference = text_field(data, "ref").unwrap_or("");
    let after = text_field(data, "after").unwrap_or("");
    let before = text_field(data, "before").unwrap_or("");
    let compare = text_field(data, "compare").unwrap_or("");

    let mut body = format!(
        "[@{pusher}](https://github.com/{pusher}) pushed on {reference}: \
         [{before} → {after}]({compare}):\n\n"
    );
    if let Some(commits) = data.get("commits").and_then(Value::as_array) {
        for commit in commits {
            let message = commit.get("message").and_then(Value::as_str).unwrap_or("");
            let url = commit.get("url").and_then(Value::as_str).unwrap_or("");
            body.push_str(&format!("- [{message}]({url})\n"));
        }
    }

    set_body(data, body);
}

/// Rewrite `<url|text>` links into markdown for GitLab payloads
/// preformatted for Google Chat.
fn gitlab_gchat(data: &mut Value) {
    let Some(body) = text_field(data, "body") else {
        return;
    };
    if let Ok(links) = Regex::new(r"<(.*?)\|(.*?)>") {
        let rewritten = links.replace_all(body, "[$2]($1)").into_owned();
        set_body(data, rewritten);
    }
}

/// Flatten MS-Teams `sections` into markdown lines for GitLab payloads
/// preformatted for Microsoft Teams.
fn gitlab_teams(data: &mut Value) {
    let mut body: Vec<String> = Vec::new();

    if let Some(sections) = data.get("sections").and_then(Value::as_array) {
        for section in sections {
            if let Some(text) = section.get("text").and_then(Value::as_str) {
                let bullets: Vec<String> =
                    text.split("\n\n").map(|line| format!("* {line}")).collect();
                body.push(format!("\n{}", bullets.join("  \n")));
            } else if let (Some(title), Some(subtitle), Some(text)) = (
                section.get("activityTitle").and_then(Value::as_str),
                section.get("activitySubtitle").and_then(Value::as_str),
                section.get("activityText").and_then(Value::as_str),
            ) {
                body.push(format!("{title} {subtitle} → {text}"));
            }
        }
    }

    set_body(data, body.join("  \n"));
}
