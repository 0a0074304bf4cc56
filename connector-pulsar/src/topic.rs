// Copyright 2025 The Drasi Authors.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! MQTT topic to Pulsar topic translation.

use connector_core::mapping::topic_has_wildcards;
use connector_core::TranslationError;

const PERSISTENT: &str = "persistent://";
const NON_PERSISTENT: &str = "non-persistent://";
const DEFAULT_TOPIC: &str = "default-topic";

const REGEX_SPECIAL: &[char] = &[
    '\\', '^', '$', '.', '|', '?', '*', '(', ')', '[', ']', '{', '}',
];

/// What a consumer subscribes to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TopicSelector {
    Topic(String),
    Pattern(String),
}

impl TopicSelector {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Topic(topic) | Self::Pattern(topic) => topic,
        }
    }
}

/// Checks MQTT wildcard placement.
///
/// `#` must be the final character and, unless it is the whole filter,
/// directly follow a `/`. `+` must fill an entire level.
pub fn validate_wildcards(topic: &str) -> Result<(), TranslationError> {
    let chars: Vec<char> = topic.chars().collect();
    let last = chars.len().saturating_sub(1);
    for (i, c) in chars.iter().enumerate() {
        match c {
            '#' if i != last => {
                return Err(TranslationError::new(topic, "'#' must be the last character"))
            }
            '#' if i > 0 && chars[i - 1] != '/' => {
                return Err(TranslationError::new(topic, "'#' must be preceded by '/'"))
            }
            '+' if (i > 0 && chars[i - 1] != '/') || (i < last && chars[i + 1] != '/') => {
                return Err(TranslationError::new(
                    topic,
                    "'+' must be between '/' separators",
                ))
            }
            _ => {}
        }
    }
    Ok(())
}

/// Translates an MQTT topic filter into a regex over Pulsar topic names.
pub fn translate_wildcards(topic: &str) -> Result<String, TranslationError> {
    validate_wildcards(topic)?;
    let mut regex = String::with_capacity(topic.len() * 2);
    for c in topic.chars() {
        match c {
            '+' => regex.push_str("[^/]+"),
            '#' => regex.push_str(".*"),
            c if REGEX_SPECIAL.contains(&c) => {
                regex.push('\\');
                regex.push(c);
            }
            c => regex.push(c),
        }
    }
    Ok(regex)
}

/// Converts an MQTT topic into a legal Pulsar local topic name.
pub fn to_pulsar_topic_name(topic: &str) -> String {
    let replaced: String = topic
        .chars()
        .map(|c| match c {
            '/' => '-',
            c if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') => c,
            _ => '_',
        })
        .collect();
    let trimmed = replaced.trim_matches(|c| matches!(c, '.' | '_' | '-'));
    if trimmed.is_empty() {
        DEFAULT_TOPIC.to_string()
    } else {
        trimmed.to_string()
    }
}

/// Fully qualified topic for `topic`, kept as-is when already qualified.
pub fn qualified_topic(topic: &str, tenant: &str, namespace: &str) -> String {
    if topic.starts_with(PERSISTENT) || topic.starts_with(NON_PERSISTENT) {
        return topic.to_string();
    }
    format!("{PERSISTENT}{tenant}/{namespace}/{}", to_pulsar_topic_name(topic))
}

/// Consumer selector for an MQTT topic: a regex pattern for wildcard
/// filters, a qualified topic otherwise.
pub fn selector_for(
    topic: &str,
    tenant: &str,
    namespace: &str,
) -> Result<TopicSelector, TranslationError> {
    if topic_has_wildcards(topic) {
        let regex = translate_wildcards(topic)?;
        Ok(TopicSelector::Pattern(format!(
            "{PERSISTENT}{tenant}/{namespace}/{regex}"
        )))
    } else {
        Ok(TopicSelector::Topic(qualified_topic(topic, tenant, namespace)))
    }
}

/// Subscription name for `topic` under the configured base name.
pub fn subscription_name(base: &str, topic: &str) -> String {
    let topic = topic
        .replace('/', "-")
        .replace('+', "wildcard")
        .replace('#', "multilevel");
    format!("{base}-{topic}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use regex::Regex;

    fn pattern(topic: &str) -> Regex {
        let translated = translate_wildcards(topic).unwrap();
        Regex::new(&format!("^{translated}$")).unwrap()
    }

    #[test]
    fn test_single_level_wildcard() {
        let re = pattern("sensors/+/temp");
        assert!(re.is_match("sensors/a1/temp"));
        assert!(!re.is_match("sensors/a1/b2/temp"));
        assert!(!re.is_match("sensors//temp"));
    }

    #[test]
    fn test_multi_level_wildcard() {
        let re = pattern("sensors/#");
        assert!(re.is_match("sensors/a1/temp"));
        assert!(re.is_match("sensors/"));
        assert!(!re.is_match("actuators/a1"));
        assert_eq!(translate_wildcards("#").unwrap(), ".*");
    }

    #[test]
    fn test_regex_characters_are_escaped() {
        let re = pattern("v1.0/+/(raw)");
        assert!(re.is_match("v1.0/dev/(raw)"));
        assert!(!re.is_match("v1x0/dev/(raw)"));
        assert_eq!(translate_wildcards("a$b/+").unwrap(), r"a\$b/[^/]+");
    }

    #[test]
    fn test_invalid_wildcard_placement() {
        for topic in ["a/#/b", "a#", "a/b+", "a/+b/c", "+a"] {
            let err = translate_wildcards(topic).unwrap_err();
            assert_eq!(err.topic, topic);
        }
        assert!(validate_wildcards("+/+/#").is_ok());
    }

    #[test]
    fn test_topic_name_conversion() {
        assert_eq!(to_pulsar_topic_name("plant/line 1/temp"), "plant-line_1-temp");
        assert_eq!(to_pulsar_topic_name("/a/b/"), "a-b");
        assert_eq!(to_pulsar_topic_name("a:b@c"), "a_b_c");
        assert_eq!(to_pulsar_topic_name("///"), "default-topic");
        assert_eq!(to_pulsar_topic_name(""), "default-topic");
    }

    #[test]
    fn test_qualified_topic_keeps_existing_prefix() {
        assert_eq!(
            qualified_topic("a/b", "public", "default"),
            "persistent://public/default/a-b"
        );
        assert_eq!(
            qualified_topic("non-persistent://t/n/x", "public", "default"),
            "non-persistent://t/n/x"
        );
    }

    #[test]
    fn test_selector_for_wildcards() {
        assert_eq!(
            selector_for("a/+", "public", "default").unwrap(),
            TopicSelector::Pattern("persistent://public/default/a/[^/]+".into())
        );
        assert_eq!(
            selector_for("a/b", "t", "n").unwrap(),
            TopicSelector::Topic("persistent://t/n/a-b".into())
        );
        assert!(selector_for("a/b#", "t", "n").is_err());
    }

    #[test]
    fn test_subscription_name() {
        assert_eq!(
            subscription_name("dynamic-mapper-subscription", "a/+/#"),
            "dynamic-mapper-subscription-a-wildcard-multilevel"
        );
    }
}
