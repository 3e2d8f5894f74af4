//! `Accept` and `Accept-Language` negotiation.
//!
//! Header values are split into entries ordered by their `q` parameter
//! (ties keep header order, `q=0` entries are dropped). A declared set is
//! matched in the client's priority order and the first declared entry that
//! the client accepts wins.

struct Entry {
    value: String,
    quality: f32,
    order: usize,
}

fn parse_entries(header: &str) -> Vec<Entry> {
    let mut entries: Vec<Entry> = header
        .split(',')
        .enumerate()
        .filter_map(|(order, part)| {
            let mut pieces = part.split(';');
            let value = pieces.next()?.trim();
            if value.is_empty() {
                return None;
            }
            let mut quality = 1.0;
            for param in pieces {
                let param = param.trim();
                if let Some(q) = param.strip_prefix("q=").or_else(|| param.strip_prefix("Q=")) {
                    quality = q.trim().parse().unwrap_or(0.0);
                }
            }
            (quality > 0.0).then(|| Entry {
                value: value.to_string(),
                quality,
                order,
            })
        })
        .collect();

    entries.sort_by(|a, b| {
        b.quality
            .partial_cmp(&a.quality)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(a.order.cmp(&b.order))
    });
    entries
}

/// Values of a quality-weighted header, most preferred first.
pub fn parse_quality_list(header: Option<&str>) -> Vec<String> {
    header
        .map(parse_entries)
        .unwrap_or_default()
        .into_iter()
        .map(|e| e.value)
        .collect()
}

/// Best declared language for an `Accept-Language` header.
///
/// With nothing declared the client's first choice is returned. With no
/// header every declared language is acceptable and the first one wins.
pub fn negotiate_language(header: Option<&str>, declared: &[String]) -> Option<String> {
    negotiate(header, declared, language_matches)
}

/// Best declared media type for an `Accept` header.
pub fn negotiate_media_type(header: Option<&str>, declared: &[String]) -> Option<String> {
    negotiate(header, declared, media_type_matches)
}

fn negotiate(
    header: Option<&str>,
    declared: &[String],
    matches: fn(&str, &str) -> bool,
) -> Option<String> {
    let requested = parse_quality_list(header);
    if declared.is_empty() {
        return requested.into_iter().next();
    }
    if header.is_none() {
        return declared.first().cloned();
    }

    requested.iter().find_map(|wanted| {
        declared
            .iter()
            .find(|offered| matches(wanted, offered))
            .cloned()
    })
}

/// `en` accepts `en-US` and the other way round.
fn language_matches(wanted: &str, offered: &str) -> bool {
    if wanted == "*" {
        return true;
    }
    let wanted = wanted.to_ascii_lowercase();
    let offered = offered.to_ascii_lowercase();
    wanted == offered
        || offered.starts_with(&format!("{}-", wanted))
        || wanted.starts_with(&format!("{}-", offered))
}

fn media_type_matches(wanted: &str, offered: &str) -> bool {
    let wanted = essence(wanted);
    let offered = essence(offered);
    if wanted == "*/*" || wanted == offered {
        return true;
    }
    match (wanted.split_once('/'), offered.split_once('/')) {
        (Some((wanted_type, "*")), Some((offered_type, _))) => wanted_type == offered_type,
        (Some((wanted_type, _)), Some((offered_type, "*"))) => wanted_type == offered_type,
        _ => false,
    }
}

fn essence(media_type: &str) -> String {
    media_type
        .split(';')
        .next()
        .unwrap_or(media_type)
        .trim()
        .to_ascii_lowercase()
}
