use nanoid::nanoid;
use tokio::io::{self, AsyncRead, AsyncReadExt};

const NANOID_ALPHABET: &[char] = &[
    '1', '2', '3', '4', '5', '6', '7', '8', '9', '0', 'a', 'A', 'b', 'B', 'c', 'C', 'd', 'D', 'e',
    'E', 'f', 'F', 'g', 'G', 'h', 'H', 'i', 'I', 'j', 'J', 'k', 'K', 'l', 'L', 'm', 'M', 'n', 'N',
    'o', 'O', 'p', 'P', 'q', 'Q', 'r', 'R', 's', 'S', 't', 'T', 'u', 'U', 'v', 'V', 'w', 'W', 'x',
    'X', 'y', 'Y', 'z', 'Z',
];
pub const CHUNK_SIZE: usize = 8192;

pub const LINK_TOKEN_LEN: usize = 8;
const STORED_NAME_LEN: usize = 20;
const RECORD_ID_LEN: usize = 21;
const MAX_CUSTOM_LINK_LEN: usize = 50;

pub async fn read_chunk<R>(reader: &mut R, size: usize) -> io::Result<Vec<u8>>
where
    R: AsyncRead + Unpin + ?Sized,
{
    let mut chunk = Vec::with_capacity(size);
    let mut take = reader.take(size as u64);
    take.read_to_end(&mut chunk).await?;

    Ok(chunk)
}

pub fn friendly_id(len: usize) -> String {
    nanoid!(len, &NANOID_ALPHABET)
}

pub fn link_token() -> String {
    friendly_id(LINK_TOKEN_LEN)
}

pub fn record_id() -> String {
    friendly_id(RECORD_ID_LEN)
}

/// Blob key for an upload, keeping the client's extension so the
/// storage directory stays browsable.
pub fn stored_name(original_name: &str) -> String {
    let id = friendly_id(STORED_NAME_LEN);
    match split_extension(original_name) {
        (_, Some(ext)) if is_safe_extension(ext) => format!("{id}.{ext}"),
        _ => id,
    }
}

fn is_safe_extension(ext: &str) -> bool {
    !ext.is_empty() && ext.len() <= 16 && ext.chars().all(|c| c.is_ascii_alphanumeric())
}

/// Splits `report.final.pdf` into (`report.final`, `pdf`). Dot-files such as
/// `.env` and names ending in a dot have no extension.
pub fn split_extension(name: &str) -> (&str, Option<&str>) {
    match name.rfind('.') {
        Some(0) | None => (name, None),
        Some(idx) if idx + 1 == name.len() => (name, None),
        Some(idx) => (&name[..idx], Some(&name[idx + 1..])),
    }
}

pub fn is_valid_custom_link(link: &str) -> bool {
    !link.is_empty()
        && link.len() <= MAX_CUSTOM_LINK_LEN
        && link
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

/// `attachment` disposition with an ASCII fallback and an RFC 5987 name for
/// everything else.
pub fn content_disposition(file_name: &str) -> String {
    let fallback: String = file_name
        .chars()
        .map(|c| match c {
            '"' | '\\' => '_',
            c if c.is_ascii() && !c.is_ascii_control() => c,
            _ => '_',
        })
        .collect();

    format!(
        r#"attachment; filename="{fallback}"; filename*=UTF-8''{}"#,
        urlencoding::encode(file_name)
    )
}
