use std::sync::Arc;

use url::Url;

use hiddencrawl_core::{FetchConfig, Transport};

pub const CRAWLER_USER_AGENT: &str = "hiddencrawl";

/// Disallow rules for the `*` user-agent group (we don't claim any more specific
/// identity than `CRAWLER_USER_AGENT`, so only the wildcard group applies).
#[derive(Debug, Default, Clone)]
pub struct RobotsRules {
    disallow: Vec<String>,
    allow: Vec<String>,
}

impl RobotsRules {
    /// True if `path` is allowed. Longest matching rule wins, ties favor Allow,
    /// and an unmatched path is always allowed.
    pub fn is_allowed(&self, path: &str) -> bool {
        let mut best_len = -1i64;
        let mut best_allowed = true;

        for rule in &self.disallow {
            if !rule.is_empty() && path.starts_with(rule.as_str()) && rule.len() as i64 > best_len {
                best_len = rule.len() as i64;
                best_allowed = false;
            }
        }
        for rule in &self.allow {
            if !rule.is_empty() && path.starts_with(rule.as_str()) && rule.len() as i64 >= best_len {
                best_len = rule.len() as i64;
                best_allowed = true;
            }
        }
        best_allowed
    }
}

/// Parses the `*` (and, if present, our own) user-agent group out of a robots.txt body.
pub fn parse_robots_txt(body: &str) -> RobotsRules {
    let mut rules = RobotsRules::default();
    let mut in_relevant_group = false;
    let mut any_group_seen = false;

    for raw_line in body.lines() {
        let line = raw_line.split('#').next().unwrap_or("").trim();
        if line.is_empty() {
            continue;
        }
        let Some((directive, value)) = line.split_once(':') else {
            continue;
        };
        let directive = directive.trim().to_ascii_lowercase();
        let value = value.trim();

        match directive.as_str() {
            "user-agent" => {
                let matches = value == "*" || value.eq_ignore_ascii_case(CRAWLER_USER_AGENT);
                if any_group_seen && matches {
                    // A later, more specific group for us overrides the wildcard.
                    rules = RobotsRules::default();
                }
                in_relevant_group = matches;
                any_group_seen = true;
            }
            "disallow" if in_relevant_group => rules.disallow.push(value.to_string()),
            "allow" if in_relevant_group => rules.allow.push(value.to_string()),
            _ => {}
        }
    }

    rules
}

/// Fetches and parses `/robots.txt` for `url`'s origin. Fails open: any transport
/// error or unparseable response is treated as "everything allowed".
pub async fn fetch_robots(transport: &Arc<dyn Transport>, origin_url: &Url) -> RobotsRules {
    let mut robots_url = origin_url.clone();
    robots_url.set_path("/robots.txt");
    robots_url.set_query(None);

    let mut config = FetchConfig::default();
    config.user_agent = CRAWLER_USER_AGENT.to_string();

    match transport.fetch(&robots_url, &config).await {
        Ok(resp) if resp.is_success() => {
            let body = String::from_utf8_lossy(&resp.body);
            parse_robots_txt(&body)
        }
        _ => RobotsRules::default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wildcard_disallow_blocks_prefix() {
        let rules = parse_robots_txt("User-agent: *\nDisallow: /private\n");
        assert!(!rules.is_allowed("/private/page"));
        assert!(rules.is_allowed("/public/page"));
    }

    #[test]
    fn empty_disallow_means_allow_all() {
        let rules = parse_robots_txt("User-agent: *\nDisallow:\n");
        assert!(rules.is_allowed("/anything"));
    }

    #[test]
    fn longest_rule_wins_over_shorter_disallow() {
        let rules = parse_robots_txt("User-agent: *\nDisallow: /a\nAllow: /a/b\n");
        assert!(rules.is_allowed("/a/b/c"));
        assert!(!rules.is_allowed("/a/x"));
    }

    #[test]
    fn unmatched_group_leaves_everything_allowed() {
        let rules = parse_robots_txt("User-agent: Googlebot\nDisallow: /secret\n");
        assert!(rules.is_allowed("/secret"));
    }

    #[test]
    fn missing_robots_txt_fails_open() {
        let rules = RobotsRules::default();
        assert!(rules.is_allowed("/anything"));
    }
}
