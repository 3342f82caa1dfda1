//! `.ini`-shaped `smb.conf` and password database parsing.
//!
//! Both files are parsed once at startup and again on every `SIGHUP`
//! (spec §6 "Config files"). Parsing never touches the live registries
//! directly — it produces plain structs the caller feeds to
//! `ShareRegistry::reload` / `UserRegistry::reload`.

use ksmbd_dtyp::{HostRules, Share, ShareFlags, User, UserFlags, UserMaps};

use crate::error::{Error, Result};

/// One parsed `username:base64(nthash)` line.
pub struct PasswordEntry {
    pub username: String,
    pub nt_hash: [u8; 16],
}

/// Abstraction over where configuration bytes come from, so tests can
/// supply in-memory strings instead of real files.
pub trait ConfigSource {
    fn read_to_string(&self) -> Result<String>;
}

/// A `ConfigSource` backed by a file on disk.
pub struct FileConfigSource {
    pub path: std::path::PathBuf,
}

impl ConfigSource for FileConfigSource {
    fn read_to_string(&self) -> Result<String> {
        Ok(std::fs::read_to_string(&self.path)?)
    }
}

/// An in-memory `ConfigSource`, used by tests and by `--import-users`
/// style one-shot invocations.
pub struct StringConfigSource(pub String);

impl ConfigSource for StringConfigSource {
    fn read_to_string(&self) -> Result<String> {
        Ok(self.0.clone())
    }
}

/// Parses a password database: one `username:base64(nthash)` entry per
/// non-empty, non-comment line.
pub fn parse_pwddb(source: &dyn ConfigSource) -> Result<Vec<PasswordEntry>> {
    let text = source.read_to_string()?;
    let mut entries = Vec::new();
    for (lineno, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let (username, hash_b64) = line.split_once(':').ok_or_else(|| Error::ConfigParse {
            section: "pwddb",
            line: lineno + 1,
            reason: "expected username:hash".into(),
        })?;
        let raw = base64_decode(hash_b64).ok_or_else(|| Error::ConfigParse {
            section: "pwddb",
            line: lineno + 1,
            reason: "invalid base64 hash".into(),
        })?;
        if raw.len() != 16 {
            return Err(Error::ConfigParse {
                section: "pwddb",
                line: lineno + 1,
                reason: "NT hash must be 16 bytes".into(),
            });
        }
        let mut nt_hash = [0u8; 16];
        nt_hash.copy_from_slice(&raw);
        entries.push(PasswordEntry {
            username: username.to_string(),
            nt_hash,
        });
    }
    Ok(entries)
}

impl From<PasswordEntry> for User {
    fn from(entry: PasswordEntry) -> Self {
        User::new(entry.username, entry.nt_hash, UserFlags::new())
    }
}

/// One `[sharename]` section of `smb.conf`.
struct RawSection {
    name: String,
    keys: Vec<(String, String)>,
}

fn parse_ini(text: &str) -> Vec<RawSection> {
    let mut sections = Vec::new();
    let mut current: Option<RawSection> = None;
    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
            continue;
        }
        if let Some(name) = line.strip_prefix('[').and_then(|s| s.strip_suffix(']')) {
            if let Some(section) = current.take() {
                sections.push(section);
            }
            current = Some(RawSection {
                name: name.trim().to_string(),
                keys: Vec::new(),
            });
            continue;
        }
        if let Some((k, v)) = line.split_once('=') {
            if let Some(section) = current.as_mut() {
                section.keys.push((k.trim().to_string(), v.trim().to_string()));
            }
        }
    }
    if let Some(section) = current.take() {
        sections.push(section);
    }
    sections
}

impl RawSection {
    fn get(&self, key: &str) -> Option<&str> {
        self.keys
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v.as_str())
    }

    fn get_list(&self, key: &str) -> Vec<String> {
        self.get(key)
            .map(|v| v.split(|c: char| c == ',' || c.is_whitespace()).filter(|s| !s.is_empty()).map(String::from).collect())
            .unwrap_or_default()
    }

    fn get_bool(&self, key: &str, default: bool) -> bool {
        match self.get(key).map(|v| v.to_ascii_lowercase()) {
            Some(v) => matches!(v.as_str(), "yes" | "true" | "1"),
            None => default,
        }
    }
}

/// Global (`[global]`) settings this daemon cares about.
#[derive(Debug, Clone, Default)]
pub struct GlobalConfig {
    pub tcp_port: Option<u16>,
    pub server_string: Option<String>,
}

/// The fully parsed `smb.conf`: global settings plus every share section.
pub struct SmbConf {
    pub global: GlobalConfig,
    pub shares: Vec<Share>,
}

/// Parses an `smb.conf`-shaped `.ini` file into a [`SmbConf`].
pub fn parse_smbconf(source: &dyn ConfigSource) -> Result<SmbConf> {
    let text = source.read_to_string()?;
    let sections = parse_ini(&text);

    let mut global = GlobalConfig::default();
    let mut shares = Vec::new();

    for section in &sections {
        if section.name.eq_ignore_ascii_case("global") {
            global.tcp_port = section.get("port").and_then(|v| v.parse().ok());
            global.server_string = section.get("server string").map(String::from);
            continue;
        }

        let flags = ShareFlags::new()
            .with_browseable(section.get_bool("browseable", true))
            .with_available(section.get_bool("available", true))
            .with_pipe(section.name.eq_ignore_ascii_case("IPC$"))
            .with_readonly(section.get_bool("read only", false))
            .with_guest_ok(section.get_bool("guest ok", false));

        let path = section.get("path").unwrap_or("");
        let comment = section.get("comment").unwrap_or("");
        let max_connections = section
            .get("max connections")
            .and_then(|v| v.parse().ok())
            .unwrap_or(0);

        let mut share = Share::new(section.name.clone(), path, comment, flags, max_connections);
        share.veto_list = section.get_list("veto files");
        share.user_maps = UserMaps {
            admin: section.get_list("admin users").into_iter().collect(),
            valid: section.get_list("valid users").into_iter().collect(),
            invalid: section.get_list("invalid users").into_iter().collect(),
            read: section.get_list("read list").into_iter().collect(),
            write: section.get_list("write list").into_iter().collect(),
        };
        share.host_rules = HostRules {
            allow: section.get_list("hosts allow"),
            deny: section.get_list("hosts deny"),
        };
        if let Some(mask) = section.get("create mask").and_then(|v| u32::from_str_radix(v, 8).ok()) {
            share.create_mask = mask;
        }
        if let Some(mask) = section.get("directory mask").and_then(|v| u32::from_str_radix(v, 8).ok()) {
            share.directory_mask = mask;
        }

        shares.push(share);
    }

    Ok(SmbConf { global, shares })
}

const BASE64_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789+/";

/// Minimal base64 encoder (standard alphabet, `=` padding), used by
/// `--import-users` to write freshly hashed passwords back into the
/// database in the same format [`parse_pwddb`] reads.
pub fn base64_encode(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len().div_ceil(3) * 4);
    for chunk in bytes.chunks(3) {
        let b0 = chunk[0] as u32;
        let b1 = *chunk.get(1).unwrap_or(&0) as u32;
        let b2 = *chunk.get(2).unwrap_or(&0) as u32;
        let n = (b0 << 16) | (b1 << 8) | b2;
        out.push(BASE64_ALPHABET[(n >> 18 & 0x3f) as usize] as char);
        out.push(BASE64_ALPHABET[(n >> 12 & 0x3f) as usize] as char);
        out.push(if chunk.len() > 1 { BASE64_ALPHABET[(n >> 6 & 0x3f) as usize] as char } else { '=' });
        out.push(if chunk.len() > 2 { BASE64_ALPHABET[(n & 0x3f) as usize] as char } else { '=' });
    }
    out
}

/// Minimal base64 decoder (standard alphabet, `=` padding), enough for
/// password-database hash fields — this daemon has no other use for
/// base64 and the existing `binrw`/`thiserror` stack doesn't pull one in.
fn base64_decode(input: &str) -> Option<Vec<u8>> {
    fn value(c: u8) -> Option<u8> {
        match c {
            b'A'..=b'Z' => Some(c - b'A'),
            b'a'..=b'z' => Some(c - b'a' + 26),
            b'0'..=b'9' => Some(c - b'0' + 52),
            b'+' => Some(62),
            b'/' => Some(63),
            _ => None,
        }
    }

    let input = input.trim().trim_end_matches('=');
    let mut out = Vec::with_capacity(input.len() * 3 / 4);
    let mut buf = 0u32;
    let mut bits = 0u32;
    for &b in input.as_bytes() {
        let v = value(b)?;
        buf = (buf << 6) | v as u32;
        bits += 6;
        if bits >= 8 {
            bits -= 8;
            out.push((buf >> bits) as u8);
        }
    }
    Some(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_global_and_one_share() {
        let ini = "\
[global]
port = 445
server string = test server

[data]
path = /srv/data
comment = Data share
browseable = yes
read only = no
valid users = alice, bob
";
        let conf = parse_smbconf(&StringConfigSource(ini.to_string())).unwrap();
        assert_eq!(conf.global.tcp_port, Some(445));
        assert_eq!(conf.shares.len(), 1);
        let share = &conf.shares[0];
        assert_eq!(share.name(), "data");
        assert!(share.flags().browseable());
        assert!(!share.flags().readonly());
        assert!(share.user_maps.is_valid("alice"));
        assert!(!share.user_maps.is_valid("mallory"));
    }

    #[test]
    fn ipc_share_gets_pipe_flag() {
        let ini = "[IPC$]\ncomment = remote IPC\n";
        let conf = parse_smbconf(&StringConfigSource(ini.to_string())).unwrap();
        assert!(conf.shares[0].flags().pipe());
    }

    #[test]
    fn pwddb_round_trips_known_hash() {
        // "31d6cfe0d16ae931b73c59d7e0c089c0" (MD4 of empty string) base64-encoded
        let raw = [
            0x31, 0xd6, 0xcf, 0xe0, 0xd1, 0x6a, 0xe9, 0x31, 0xb7, 0x3c, 0x59, 0xd7, 0xe0, 0xc0,
            0x89, 0xc0,
        ];
        let b64 = base64_encode(&raw);
        let line = format!("alice:{b64}\n");
        let entries = parse_pwddb(&StringConfigSource(line)).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].username, "alice");
        assert_eq!(entries[0].nt_hash, raw);
    }

    #[test]
    fn pwddb_rejects_malformed_line() {
        let entries = parse_pwddb(&StringConfigSource("not-a-valid-line\n".to_string()));
        assert!(entries.is_err());
    }

    #[test]
    fn base64_round_trips_through_decode() {
        let encoded = base64_encode(b"hello world");
        assert_eq!(base64_decode(&encoded).unwrap(), b"hello world");
    }
}
