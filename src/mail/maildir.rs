use anyhow::{Context, Result};
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use chrono::{DateTime, Utc};
use rayon::prelude::*;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use super::threading::thread_records;
use super::types::{Address, MailHeader, MaildirFlags};
use crate::projection::Record;

/// Every message file under `root`: files inside a `cur/` or `new/`
/// directory, at any depth, so both a single folder and a whole maildir
/// tree work.
pub fn message_files(root: &Path) -> Result<Vec<PathBuf>> {
    if !root.is_dir() {
        anyhow::bail!("maildir {} is not a directory", root.display());
    }
    let files = WalkDir::new(root)
        .follow_links(true)
        .into_iter()
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry),
            Err(err) => {
                debug!(error = %err, "skipping unreadable maildir entry");
                None
            }
        })
        .filter(|entry| entry.file_type().is_file())
        .filter(|entry| {
            entry
                .path()
                .parent()
                .and_then(|p| p.file_name())
                .and_then(|n| n.to_str())
                .is_some_and(|n| n == "cur" || n == "new")
        })
        .map(|entry| entry.into_path())
        .collect();
    Ok(files)
}

/// Scan a maildir and parse the headers of every message in parallel.
/// `progress` receives (parsed, total).
pub fn scan_maildir<F>(root: &Path, user_email: Option<&str>, progress: F) -> Result<Vec<MailHeader>>
where
    F: Fn(usize, usize) + Sync,
{
    let files = message_files(root)?;
    let total = files.len();
    progress(0, total);

    let processed = AtomicUsize::new(0);
    let failed = AtomicUsize::new(0);
    let headers: Vec<MailHeader> = files
        .par_iter()
        .filter_map(|path| {
            let result = parse_mail_file(path, user_email);
            let current = processed.fetch_add(1, Ordering::Relaxed) + 1;
            if current % 100 == 0 || current == total {
                progress(current, total);
            }
            match result {
                Ok(header) => Some(header),
                Err(err) => {
                    failed.fetch_add(1, Ordering::Relaxed);
                    debug!(path = %path.display(), error = %err, "failed to parse message");
                    None
                }
            }
        })
        .collect();

    let failed = failed.into_inner();
    if failed > 0 {
        warn!(failed, "some messages could not be parsed");
    }
    info!(root = %root.display(), messages = headers.len(), "scanned maildir");
    Ok(headers)
}

/// Scan a maildir and thread its messages into engine records.
pub fn load_maildir<F>(root: &Path, user_email: Option<&str>, progress: F) -> Result<Vec<Record>>
where
    F: Fn(usize, usize) + Sync,
{
    let headers = scan_maildir(root, user_email, progress)?;
    Ok(thread_records(headers))
}

/// Parse the header block of a single maildir file.
pub fn parse_mail_file(path: &Path, user_email: Option<&str>) -> Result<MailHeader> {
    let file = std::fs::File::open(path)
        .with_context(|| format!("failed to open {}", path.display()))?;
    let reader = BufReader::new(file);

    let mut fields = HeaderFields::default();
    let mut current: Option<(String, String)> = None;

    for line in reader.split(b'\n') {
        let line = line?;
        let line = String::from_utf8_lossy(&line);
        let line = line.trim_end_matches('\r');

        // blank line ends the header block
        if line.is_empty() {
            break;
        }
        if line.starts_with(' ') || line.starts_with('\t') {
            if let Some((_, value)) = current.as_mut() {
                value.push(' ');
                value.push_str(line.trim());
            }
            continue;
        }
        if let Some((name, value)) = current.take() {
            fields.save(&name, &value);
        }
        if let Some(colon) = line.find(':') {
            current = Some((
                line[..colon].trim().to_lowercase(),
                line[colon + 1..].trim().to_string(),
            ));
        }
    }
    if let Some((name, value)) = current.take() {
        fields.save(&name, &value);
    }

    let date = match fields.date.as_deref().and_then(parse_date) {
        Some(date) => date,
        None => modified_time(path),
    };
    let from = fields.from.as_deref().map(parse_email_address);
    let is_sent = match (user_email, from.as_ref()) {
        (Some(me), Some(from)) => from.addr.eq_ignore_ascii_case(me.trim()),
        _ => false,
    };

    Ok(MailHeader {
        path: path.to_path_buf(),
        message_id: fields.message_id,
        in_reply_to: fields.in_reply_to,
        references: fields.references,
        from,
        to: fields.to.as_deref().map(parse_email_address),
        subject: fields.subject,
        date,
        flags: parse_flags_from_filename(path),
        is_sent,
    })
}

#[derive(Default)]
struct HeaderFields {
    message_id: Option<String>,
    in_reply_to: Option<String>,
    references: Vec<String>,
    from: Option<String>,
    to: Option<String>,
    subject: Option<String>,
    date: Option<String>,
}

impl HeaderFields {
    fn save(&mut self, name: &str, value: &str) {
        match name {
            "message-id" => self.message_id = non_empty(extract_message_id(value)),
            "in-reply-to" => {
                self.in_reply_to = value
                    .split_whitespace()
                    .next()
                    .and_then(|v| non_empty(extract_message_id(v)))
            }
            "references" => {
                self.references = value
                    .split_whitespace()
                    .map(extract_message_id)
                    .filter(|s| !s.is_empty())
                    .collect();
            }
            "from" => self.from = Some(value.to_string()),
            "to" => self.to = Some(value.to_string()),
            "subject" => self.subject = Some(decode_header_value(value)),
            "date" => self.date = Some(value.to_string()),
            _ => {}
        }
    }
}

fn non_empty(s: String) -> Option<String> {
    if s.is_empty() { None } else { Some(s) }
}

/// `<foo@bar.com>` -> `foo@bar.com`
fn extract_message_id(s: &str) -> String {
    let s = s.trim();
    s.strip_prefix('<')
        .and_then(|s| s.strip_suffix('>'))
        .unwrap_or(s)
        .to_string()
}

/// "Name <email@example.com>" or a bare "email@example.com".
fn parse_email_address(s: &str) -> Address {
    let s = s.trim();
    if let (Some(start), Some(end)) = (s.find('<'), s.rfind('>')) {
        if start < end {
            let name = s[..start].trim().trim_matches('"').trim();
            return Address {
                name: if name.is_empty() {
                    None
                } else {
                    Some(decode_header_value(name))
                },
                addr: s[start + 1..end].trim().to_string(),
            };
        }
    }
    Address {
        name: None,
        addr: s.to_string(),
    }
}

/// Decode RFC 2047 encoded words (`=?UTF-8?Q?...?=`, `=?UTF-8?B?...?=`).
/// Whitespace between two adjacent encoded words is dropped.
pub fn decode_header_value(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut rest = value;
    let mut after_word = false;

    while let Some(start) = rest.find("=?") {
        let (before, tail) = rest.split_at(start);
        match encoded_word(tail) {
            Some((decoded, remainder)) => {
                if !(after_word && before.trim().is_empty()) {
                    out.push_str(before);
                }
                out.push_str(&decoded);
                rest = remainder;
                after_word = true;
            }
            None => {
                out.push_str(before);
                out.push_str("=?");
                rest = &tail[2..];
                after_word = false;
            }
        }
    }
    out.push_str(rest);
    out
}

fn encoded_word(s: &str) -> Option<(String, &str)> {
    let body = s.strip_prefix("=?")?;
    let mut parts = body.splitn(3, '?');
    let _charset = parts.next()?;
    let encoding = parts.next()?;
    let remainder = parts.next()?;
    let end = remainder.find("?=")?;
    let text = &remainder[..end];
    let bytes = match encoding {
        "B" | "b" => STANDARD.decode(text.trim()).ok()?,
        "Q" | "q" => decode_q(text),
        _ => return None,
    };
    Some((String::from_utf8_lossy(&bytes).into_owned(), &remainder[end + 2..]))
}

fn decode_q(text: &str) -> Vec<u8> {
    let bytes = text.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'_' => {
                out.push(b' ');
                i += 1;
            }
            b'=' => {
                let byte = text
                    .get(i + 1..i + 3)
                    .and_then(|hex| u8::from_str_radix(hex, 16).ok());
                match byte {
                    Some(byte) => {
                        out.push(byte);
                        i += 3;
                    }
                    None => {
                        out.push(b'=');
                        i += 1;
                    }
                }
            }
            other => {
                out.push(other);
                i += 1;
            }
        }
    }
    out
}

/// RFC 2822 date, tolerating a trailing comment such as "(PST)".
fn parse_date(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    let value = match value.find(" (") {
        Some(pos) => &value[..pos],
        None => value,
    };
    DateTime::parse_from_rfc2822(value)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

fn modified_time(path: &Path) -> DateTime<Utc> {
    std::fs::metadata(path)
        .and_then(|m| m.modified())
        .map(DateTime::<Utc>::from)
        .unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
}

/// Flags from the maildir filename suffix (e.g. ":2,RS").
pub fn parse_flags_from_filename(path: &Path) -> MaildirFlags {
    let filename = path.file_name().and_then(|n| n.to_str()).unwrap_or("");
    let mut flags = MaildirFlags::default();
    if let Some(pos) = filename.rfind(":2,") {
        for c in filename[pos + 3..].chars() {
            match c {
                'S' => flags.seen = true,
                'R' => flags.replied = true,
                'F' => flags.flagged = true,
                'D' => flags.draft = true,
                'T' => flags.trashed = true,
                _ => {}
            }
        }
    }
    flags
}
