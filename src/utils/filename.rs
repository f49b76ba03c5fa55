use chrono::{DateTime, Utc};
use percent_encoding::{NON_ALPHANUMERIC, percent_decode_str, utf8_percent_encode};
use uuid::Uuid;

pub fn extension_of(filename: &str) -> Option<String> {
    let (stem, ext) = filename.rsplit_once('.')?;
    if stem.is_empty() || ext.is_empty() {
        return None;
    }
    Some(ext.to_lowercase())
}

/// Name under which temporary storage keeps an upload:
/// `{YYYYMMDD}_{HHMMSS}_{uuid}_{original}`.
pub fn staged_object_name(original: &str, at: DateTime<Utc>, id: Uuid) -> String {
    format!("{}_{}_{}", at.format("%Y%m%d_%H%M%S"), id, original)
}

/// Recovers the user's file name from a staged object name. Names without
/// the prefix are returned unchanged.
pub fn strip_staging_prefix(name: &str) -> &str {
    let mut parts = name.splitn(4, '_');
    let (Some(date), Some(time), Some(id), Some(rest)) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return name;
    };

    let is_digits = |s: &str, len: usize| s.len() == len && s.bytes().all(|b| b.is_ascii_digit());
    if is_digits(date, 8) && is_digits(time, 6) && Uuid::parse_str(id).is_ok() && !rest.is_empty()
    {
        rest
    } else {
        name
    }
}

pub fn content_type_for_extension(extension: &str) -> Option<&'static str> {
    let content_type = match extension.to_lowercase().as_str() {
        "mp4" => "video/mp4",
        "webm" => "video/webm",
        "ogg" => "video/ogg",
        "mp3" => "audio/mpeg",
        "wav" => "audio/wav",
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "svg" => "image/svg+xml",
        "pdf" => "application/pdf",
        "txt" => "text/plain",
        "csv" => "text/csv",
        "md" => "text/markdown",
        "doc" => "application/msword",
        "docx" => "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
        "xls" => "application/vnd.ms-excel",
        "xlsx" => "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
        "ppt" => "application/vnd.ms-powerpoint",
        "pptx" => "application/vnd.openxmlformats-officedocument.presentationml.presentation",
        "zip" => "application/zip",
        _ => return None,
    };
    Some(content_type)
}

pub fn content_type_for_name(filename: &str) -> String {
    extension_of(filename)
        .and_then(|ext| content_type_for_extension(&ext))
        .unwrap_or(mime::APPLICATION_OCTET_STREAM.essence_str())
        .to_string()
}

/// Types a browser can render inline (image, video, audio, PDF, text).
pub fn is_previewable(content_type: &str) -> bool {
    content_type.starts_with("video/")
        || content_type.starts_with("audio/")
        || content_type.starts_with("image/")
        || content_type == "application/pdf"
        || content_type.starts_with("text/")
}

pub fn content_disposition(disposition_type: &str, filename: &str) -> String {
    let ascii_filename = filename
        .chars()
        .filter(|c| c.is_ascii() && !c.is_control() && *c != '"' && *c != '\\' && *c != ';')
        .take(128)
        .collect::<String>();
    let fallback_filename = if ascii_filename.is_empty() {
        "file"
    } else {
        &ascii_filename
    };

    let encoded_filename = utf8_percent_encode(filename, NON_ALPHANUMERIC).to_string();

    format!(
        "{}; filename=\"{}\"; filename*=UTF-8''{}",
        disposition_type, fallback_filename, encoded_filename
    )
}

/// Extracts the file name from a `Content-Disposition` header value,
/// preferring the RFC 5987 `filename*` form.
pub fn parse_content_disposition_filename(header: &str) -> Option<String> {
    let mut plain = None;
    for param in header.split(';').map(str::trim) {
        let Some((key, value)) = param.split_once('=') else {
            continue;
        };
        match key.trim().to_ascii_lowercase().as_str() {
            "filename*" => {
                let encoded = value
                    .trim()
                    .split_once("''")
                    .map(|(_, v)| v)
                    .unwrap_or(value.trim());
                if let Ok(decoded) = percent_decode_str(encoded).decode_utf8() {
                    if !decoded.is_empty() {
                        return Some(decoded.into_owned());
                    }
                }
            }
            "filename" => {
                let value = value.trim().trim_matches('"');
                if !value.is_empty() {
                    plain = Some(value.to_string());
                }
            }
            _ => {}
        }
    }
    plain
}
