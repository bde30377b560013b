//! Target input normalization.
//!
//! Accepts the forms users paste (`@name`, `name`, `t.me/name`,
//! `https://t.me/s/name`) and reduces them to the canonical `@name` form
//! used as the resolution key and stored as `target_input`.

use anyhow::{bail, Context, Result};
use url::Url;

const TELEGRAM_HOSTS: [&str; 4] = ["t.me", "telegram.me", "www.t.me", "www.telegram.me"];

/// Normalize a raw target into `@name` form.
///
/// Private invite links are rejected: only public targets, or targets the
/// session already has access to, can be scraped.
pub fn normalize_target(raw: &str) -> Result<String> {
    let target = raw.trim();
    if target.is_empty() {
        bail!("Target cannot be empty.");
    }

    if target.starts_with("http://") || target.starts_with("https://") {
        return normalize_url(target);
    }

    if target.starts_with("t.me/") || target.starts_with("telegram.me/") {
        return normalize_target(&format!("https://{}", target));
    }

    if let Some(username) = target.strip_prefix('@') {
        if username.is_empty() {
            bail!("Invalid target: {:?}", raw);
        }
        return Ok(format!("@{}", username));
    }

    if target.contains('/') {
        bail!("Invalid target format: {:?}", raw);
    }

    Ok(format!("@{}", target))
}

fn normalize_url(target: &str) -> Result<String> {
    let url =
        Url::parse(target).with_context(|| format!("Invalid Telegram target URL: {}", target))?;
    let host = url.host_str().unwrap_or_default().to_ascii_lowercase();
    if !TELEGRAM_HOSTS.contains(&host.as_str()) {
        bail!("Unsupported target host: {}", host);
    }

    let parts: Vec<&str> = url
        .path_segments()
        .map(|segments| segments.filter(|p| !p.is_empty()).collect())
        .unwrap_or_default();
    let Some(first) = parts.first().copied() else {
        bail!("Invalid Telegram target URL: {}", target);
    };

    if first == "joinchat" || first.starts_with('+') {
        bail!(
            "Private invite links are not supported. Use public targets or targets \
             where your account already has legitimate access."
        );
    }

    let name = if first == "s" && parts.len() >= 2 {
        parts[1]
    } else {
        first
    };
    Ok(format!("@{}", name.trim_start_matches('@')))
}

/// Normalize a list of targets, dropping duplicates while keeping order.
pub fn normalize_targets<S: AsRef<str>>(raw: &[S]) -> Result<Vec<String>> {
    let mut targets: Vec<String> = Vec::with_capacity(raw.len());
    for item in raw {
        let normalized = normalize_target(item.as_ref())?;
        if !targets.contains(&normalized) {
            targets.push(normalized);
        }
    }
    Ok(targets)
}
