//! Small text helpers used across the bot.

/// Truncates chat-bound text to at most `max_chars` characters, preferring to
/// cut at a sentence end and falling back to a word boundary.
///
/// UTF-8 safe: counts characters, not bytes, so emotes and accented text
/// never split mid-character.
pub fn smart_truncate(s: &str, max_chars: usize) -> String {
    let chars: Vec<char> = s.chars().collect();
    if chars.len() <= max_chars {
        return s.to_string();
    }
    if max_chars <= 3 {
        return chars.into_iter().take(max_chars).collect();
    }

    let window: Vec<char> = chars.into_iter().take(max_chars).collect();
    let floor = max_chars / 2;

    // Prefer ending on a complete sentence in the back half of the window.
    if let Some(idx) = window
        .iter()
        .rposition(|c| matches!(c, '.' | '!' | '?'))
        .filter(|&idx| idx >= floor)
    {
        return window[..=idx].iter().collect();
    }

    // Otherwise break at the last space so no word is cut in half.
    let cut = window
        .iter()
        .rposition(|c| c.is_whitespace())
        .filter(|&idx| idx >= floor)
        .unwrap_or(max_chars - 3);
    let head: String = window[..cut].iter().collect();
    format!("{}...", head.trim_end())
}

/// Strips markup and decodes the handful of entities search snippets carry.
pub fn clean_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut in_tag = false;
    for c in s.chars() {
        match c {
            '<' => in_tag = true,
            '>' => in_tag = false,
            _ if !in_tag => out.push(c),
            _ => {}
        }
    }
    out.replace("&amp;", "&")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#x27;", "'")
        .replace("&#39;", "'")
        .replace("&nbsp;", " ")
}

/// Hostname of a URL without the `www.` prefix, for citing sources in chat.
pub fn extract_domain(url: &str) -> Option<String> {
    let rest = url.split_once("://").map(|(_, r)| r).unwrap_or(url);
    let host = rest.split(['/', '?', '#']).next()?;
    let host = host.split('@').last()?.split(':').next()?;
    if host.is_empty() {
        return None;
    }
    Some(host.strip_prefix("www.").unwrap_or(host).to_string())
}

/// Parses the arguments of a clip command into a clamped duration and an
/// optional title. A leading number is the duration; everything after it
/// (or everything, when the first token is not a number) is the title.
pub fn parse_clip_command(args: &str, min: u32, max: u32, default: u32) -> (u32, Option<String>) {
    let trimmed = args.trim();
    if trimmed.is_empty() {
        return (default, None);
    }
    let (first, rest) = match trimmed.split_once(char::is_whitespace) {
        Some((f, r)) => (f, r.trim_start()),
        None => (trimmed, ""),
    };
    match first.parse::<u32>() {
        Ok(secs) => {
            let title = (!rest.is_empty()).then(|| rest.to_string());
            (secs.clamp(min, max), title)
        }
        Err(_) => (default, Some(trimmed.to_string())),
    }
}
