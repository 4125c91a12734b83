// Best-effort decoding of the external binary's text output.
//
// Each recognised line kind has its own matcher; matchers are tried in order
// and the first hit wins. A format change upstream therefore breaks a single
// matcher instead of the whole parser. Lines nobody recognises are dropped.

use lazy_static::lazy_static;
use regex::Regex;
use std::path::PathBuf;

use super::commands::{DESTINATION_MARKER, POSTPROCESS_MARKER, PROGRESS_MARKER, TITLE_MARKER};
use crate::models::{clamp_percent, OutputLine, ProgressEvent, Stage, StatusLine};

lazy_static! {
    static ref HUMAN_PROGRESS_RE: Regex = Regex::new(
        r"^\[download\]\s+(?P<percent>\S+)%(?:\s+of\s+~?\s*(?P<total>\S+))?(?:\s+at\s+(?P<speed>\S+))?(?:\s+ETA\s+(?P<eta>\S+))?"
    ).unwrap();
    static ref ALREADY_RE: Regex =
        Regex::new(r"^\[download\]\s+(?P<path>.+?)\s+has already been downloaded").unwrap();
    static ref DOWNLOAD_DEST_RE: Regex =
        Regex::new(r"^\[download\]\s+Destination:\s+(?P<path>.+)$").unwrap();
    static ref MERGE_RE: Regex =
        Regex::new(r#"^\[(?:Merger|ffmpeg)\]\s+Merging formats into\s+"(?P<path>.+)"$"#).unwrap();
    static ref CONVERT_RE: Regex = Regex::new(
        r"^\[(?:ExtractAudio|VideoRemuxer|VideoConvertor)\].*?Destination:\s+(?P<path>.+)$"
    ).unwrap();
    static ref VIDEO_TITLE_RE: Regex =
        Regex::new(r"^\[download\]\s+Downloading video:\s+(?P<title>.+)$").unwrap();
    static ref SIZE_RE: Regex =
        Regex::new(r"^(?P<num>\d+(?:\.\d+)?)\s*(?P<unit>[KMGTP]?i?B)?$").unwrap();
}

type Matcher = fn(&str) -> Option<OutputLine>;

/// Ordered matchers; the first one that recognises a line wins.
const MATCHERS: &[(&str, Matcher)] = &[
    ("machine-progress", match_machine_progress),
    ("postprocess", match_postprocess),
    ("title-marker", match_title_marker),
    ("destination-marker", match_destination_marker),
    ("error", match_error),
    ("warning", match_warning),
    ("already-downloaded", match_already_downloaded),
    ("merge", match_merge),
    ("convert", match_convert),
    ("download-destination", match_download_destination),
    ("video-title", match_video_title),
    ("human-progress", match_human_progress),
];

/// Decode one line of subprocess output. Never fails; unknown lines yield `None`.
pub fn parse_line(line: &str) -> Option<OutputLine> {
    // Without --newline progress updates are separated by carriage returns
    let line = line
        .rsplit('\r')
        .map(str::trim)
        .find(|segment| !segment.is_empty())?;

    MATCHERS.iter().find_map(|(_, matcher)| matcher(line))
}

/// Name of the matcher that recognises `line`, if any
pub fn classify(line: &str) -> Option<&'static str> {
    let line = line.rsplit('\r').map(str::trim).find(|s| !s.is_empty())?;
    MATCHERS
        .iter()
        .find(|(_, matcher)| matcher(line).is_some())
        .map(|(name, _)| *name)
}

fn match_machine_progress(line: &str) -> Option<OutputLine> {
    let rest = line.strip_prefix(PROGRESS_MARKER)?;
    let mut fields = rest.split_whitespace();

    let downloaded = fields.next().and_then(parse_number);
    let total = fields.next().and_then(parse_number);
    let estimate = fields.next().and_then(parse_number);
    let speed = fields.next().and_then(parse_number);
    let eta = fields.next().and_then(parse_number);

    let downloaded_bytes = downloaded.map(|d| d as u64).unwrap_or(0);
    let total_bytes = total.or(estimate).map(|t| t as u64).filter(|t| *t > 0);
    let percent = match total_bytes {
        Some(total) => downloaded_bytes as f64 / total as f64 * 100.0,
        None => 0.0,
    };

    Some(OutputLine::Progress(ProgressEvent {
        percent: clamp_percent(percent),
        downloaded_bytes,
        total_bytes,
        speed_bytes_per_sec: speed,
        eta_seconds: eta.map(|e| e as u64),
        stage: Stage::Downloading,
    }))
}

fn match_postprocess(line: &str) -> Option<OutputLine> {
    let rest = line.strip_prefix(POSTPROCESS_MARKER)?;
    let name = rest.split_whitespace().next().unwrap_or("").to_string();
    let stage = if name.contains("Merge") {
        Stage::Merging
    } else {
        Stage::Converting
    };
    Some(OutputLine::Status(StatusLine::Postprocess { stage, name }))
}

fn match_title_marker(line: &str) -> Option<OutputLine> {
    let title = line.strip_prefix(TITLE_MARKER)?.trim();
    (!title.is_empty() && title != "NA").then(|| OutputLine::Status(StatusLine::Title(title.to_string())))
}

fn match_destination_marker(line: &str) -> Option<OutputLine> {
    let path = line.strip_prefix(DESTINATION_MARKER)?.trim();
    (!path.is_empty() && path != "NA")
        .then(|| OutputLine::Status(StatusLine::Destination(PathBuf::from(path))))
}

fn match_error(line: &str) -> Option<OutputLine> {
    line.starts_with("ERROR:")
        .then(|| OutputLine::Status(StatusLine::Error(line.to_string())))
}

fn match_warning(line: &str) -> Option<OutputLine> {
    line.starts_with("WARNING:")
        .then(|| OutputLine::Status(StatusLine::Warning(line.to_string())))
}

fn match_already_downloaded(line: &str) -> Option<OutputLine> {
    let caps = ALREADY_RE.captures(line)?;
    Some(OutputLine::Status(StatusLine::AlreadyDownloaded(PathBuf::from(&caps["path"]))))
}

fn match_merge(line: &str) -> Option<OutputLine> {
    let caps = MERGE_RE.captures(line)?;
    Some(OutputLine::Status(StatusLine::Merging(PathBuf::from(&caps["path"]))))
}

fn match_convert(line: &str) -> Option<OutputLine> {
    let caps = CONVERT_RE.captures(line)?;
    Some(OutputLine::Status(StatusLine::Converting(PathBuf::from(caps["path"].trim()))))
}

fn match_download_destination(line: &str) -> Option<OutputLine> {
    let caps = DOWNLOAD_DEST_RE.captures(line)?;
    Some(OutputLine::Status(StatusLine::DownloadTarget(PathBuf::from(caps["path"].trim()))))
}

fn match_video_title(line: &str) -> Option<OutputLine> {
    let caps = VIDEO_TITLE_RE.captures(line)?;
    Some(OutputLine::Status(StatusLine::Title(caps["title"].trim().to_string())))
}

fn match_human_progress(line: &str) -> Option<OutputLine> {
    let caps = HUMAN_PROGRESS_RE.captures(line)?;

    // A malformed percent still counts as a progress line, pinned to 0
    let percent = clamp_percent(caps["percent"].parse::<f64>().unwrap_or(0.0));
    let total_bytes = caps.name("total").and_then(|m| parse_size(m.as_str()));
    let speed = caps
        .name("speed")
        .and_then(|m| m.as_str().strip_suffix("/s"))
        .and_then(parse_size)
        .map(|s| s as f64);
    let eta = caps.name("eta").and_then(|m| parse_clock(m.as_str()));

    Some(OutputLine::Progress(ProgressEvent {
        percent,
        downloaded_bytes: total_bytes
            .map(|total| (total as f64 * percent / 100.0).round() as u64)
            .unwrap_or(0),
        total_bytes,
        speed_bytes_per_sec: speed,
        eta_seconds: eta,
        stage: Stage::Downloading,
    }))
}

/// Plain number as printed by the progress template; "NA" and junk are `None`
fn parse_number(token: &str) -> Option<f64> {
    token
        .parse::<f64>()
        .ok()
        .filter(|n| n.is_finite() && *n >= 0.0)
}

/// Parse sizes such as "10.50MiB", "512KiB", "1.2GB" or "300B" into bytes
pub fn parse_size(token: &str) -> Option<u64> {
    let caps = SIZE_RE.captures(token.trim())?;
    let number: f64 = caps["num"].parse().ok()?;
    let multiplier: f64 = match caps.name("unit").map(|m| m.as_str()) {
        None | Some("B") => 1.0,
        Some("KiB") => 1024.0,
        Some("MiB") => 1024.0 * 1024.0,
        Some("GiB") => 1024.0 * 1024.0 * 1024.0,
        Some("TiB") => 1024.0 * 1024.0 * 1024.0 * 1024.0,
        Some("PiB") => 1024.0 * 1024.0 * 1024.0 * 1024.0 * 1024.0,
        Some("KB") => 1e3,
        Some("MB") => 1e6,
        Some("GB") => 1e9,
        Some("TB") => 1e12,
        Some("PB") => 1e15,
        Some(_) => return None,
    };
    Some((number * multiplier).round() as u64)
}

/// Parse "SS", "MM:SS" or "HH:MM:SS" into seconds
pub fn parse_clock(token: &str) -> Option<u64> {
    token
        .split(':')
        .try_fold((0u64, 0usize), |(acc, parts), part| {
            let value: u64 = part.parse().ok()?;
            Some((acc.checked_mul(60)?.checked_add(value)?, parts + 1))
        })
        .filter(|(_, parts)| (1..=3).contains(parts))
        .map(|(seconds, _)| seconds)
}
