//! Raw RFC 822 messages turned into persistable document sets
//!
//! A message is split into a `flags` document (mutable state), a `head`
//! document (headers and MIME structure) and one `cnt` document per
//! distinct leaf body, addressed by the SHA-256 of its encoded bytes.

use chrono::{DateTime, Utc};
use mailparse::{body::Body, MailHeaderMap, ParsedMail};
use serde_json::{json, Map, Value};
use sha2::{Digest, Sha256};
use std::collections::HashSet;

use crate::content;
use crate::docstore::DocType;
use crate::error::{Error, Result};
use crate::types::{Headers, MailId, MailboxRecord, MessageFlag, TagSet, Uid};

/// Hex SHA-256 digest
pub fn content_hash(bytes: &[u8]) -> String {
    format!("{:x}", Sha256::digest(bytes))
}

/// Something that can be written to the document store as a new mail
pub trait PersistableMail: Send + Sync {
    /// Global identifier the mail will be stored under
    fn ident(&self) -> MailId;

    /// Documents to create for this mail, tagged with its UID and mailbox
    fn documents_for_save(&self, uid: Uid, mailbox: &MailboxRecord) -> Vec<Value>;
}

/// A leaf body extracted from the message
#[derive(Debug, Clone, PartialEq)]
struct BodyPart {
    phash: String,
    raw: String,
    content_type: String,
    transfer_encoding: Option<String>,
    disposition: Option<String>,
}

impl BodyPart {
    fn to_document(&self) -> Value {
        json!({
            "type": DocType::Content.as_str(),
            "phash": self.phash,
            "raw": self.raw,
            "content-type": self.content_type,
            "content-transfer-encoding": self.transfer_encoding,
            "content-disposition": self.disposition,
        })
    }
}

/// A mail parsed from its raw bytes, ready to be stored
#[derive(Debug, Clone)]
pub struct InputMail {
    chash: String,
    headers: Headers,
    head: Value,
    bodies: Vec<BodyPart>,
    size: usize,
    date: Option<DateTime<Utc>>,
    pub flags: Vec<MessageFlag>,
    pub tags: TagSet,
}

impl InputMail {
    pub fn from_raw(raw: &[u8]) -> Result<Self> {
        let parsed = mailparse::parse_mail(raw)
            .map_err(|e| Error::InvalidMessage(format!("Failed to parse message: {}", e)))?;

        let mut bodies = Vec::new();
        let head = describe_part(&parsed, &mut bodies);
        let headers = header_pairs(&parsed);
        let date = parsed
            .headers
            .get_first_value("Date")
            .and_then(|value| mailparse::dateparse(&value).ok())
            .and_then(|secs| DateTime::from_timestamp(secs, 0));

        Ok(Self {
            chash: content_hash(raw),
            headers,
            head,
            bodies,
            size: raw.len(),
            date,
            flags: Vec::new(),
            tags: TagSet::new(),
        })
    }

    pub fn chash(&self) -> &str {
        &self.chash
    }

    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    pub fn subject(&self) -> &str {
        self.headers.get("Subject").unwrap_or("")
    }

    pub fn date(&self) -> Option<DateTime<Utc>> {
        self.date
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Payload hashes of all leaf bodies, in part order
    pub fn payload_hashes(&self) -> Vec<&str> {
        self.bodies.iter().map(|b| b.phash.as_str()).collect()
    }

    fn flags_document(&self, uid: Uid, mailbox: &MailboxRecord) -> Value {
        let seen = self.flags.contains(&MessageFlag::Seen);
        let flags: Vec<String> = self.flags.iter().map(MessageFlag::to_imap_string).collect();

        json!({
            "type": DocType::Flags.as_str(),
            "chash": self.chash,
            "mbox": mailbox.name,
            "mbox_uuid": mailbox.uuid.to_string(),
            "uid": uid,
            "flags": flags,
            "tags": self.tags.to_vec(),
            "seen": seen,
            "recent": !seen,
            "deleted": self.flags.contains(&MessageFlag::Deleted),
        })
    }

    fn head_document(&self) -> Value {
        let mut head = self.head.clone();
        if let Value::Object(map) = &mut head {
            map.insert("type".to_string(), json!(DocType::Head.as_str()));
            map.insert("chash".to_string(), json!(self.chash));
            map.insert("size".to_string(), json!(self.size));
            map.insert(
                "date".to_string(),
                json!(self.date.map(|date| date.to_rfc3339())),
            );
            map.insert("subject".to_string(), json!(self.subject()));
        }
        head
    }
}

impl PersistableMail for InputMail {
    fn ident(&self) -> MailId {
        MailId::new(self.chash.clone())
    }

    fn documents_for_save(&self, uid: Uid, mailbox: &MailboxRecord) -> Vec<Value> {
        let mut docs = vec![self.flags_document(uid, mailbox), self.head_document()];

        let mut seen = HashSet::new();
        for body in &self.bodies {
            if seen.insert(body.phash.as_str()) {
                docs.push(body.to_document());
            }
        }
        docs
    }
}

fn header_pairs(part: &ParsedMail) -> Headers {
    part.headers
        .iter()
        .map(|header| (header.get_key(), header.get_value()))
        .collect()
}

/// Head descriptor of `part`, collecting leaf bodies into `bodies`
fn describe_part(part: &ParsedMail, bodies: &mut Vec<BodyPart>) -> Value {
    let headers = header_pairs(part);
    let ctype = part.ctype.mimetype.clone();

    if !part.subparts.is_empty() {
        let mut part_map = Map::new();
        for (n, sub) in part.subparts.iter().enumerate() {
            part_map.insert((n + 1).to_string(), describe_part(sub, bodies));
        }
        return json!({
            "multi": true,
            "ctype": ctype,
            "headers": headers,
            "parts": part.subparts.len(),
            "part_map": part_map,
        });
    }

    let body = part.get_body_encoded();
    let encoded = match &body {
        Body::Base64(b) | Body::QuotedPrintable(b) => b.get_raw(),
        Body::SevenBit(b) | Body::EightBit(b) => b.get_raw(),
        Body::Binary(b) => b.get_raw(),
    };
    let declared = part.headers.get_first_value("Content-Transfer-Encoding");

    // Bodies are stored as text; anything else goes in as base64
    let (raw, transfer_encoding) = match std::str::from_utf8(encoded) {
        Ok(text) => (text.to_string(), declared),
        Err(_) => (content::encode_base64(encoded), Some("base64".to_string())),
    };

    let phash = content_hash(encoded);
    bodies.push(BodyPart {
        phash: phash.clone(),
        raw,
        content_type: part
            .headers
            .get_first_value("Content-Type")
            .unwrap_or_else(|| ctype.clone()),
        transfer_encoding,
        disposition: part.headers.get_first_value("Content-Disposition"),
    });

    json!({
        "multi": false,
        "ctype": ctype,
        "headers": headers,
        "phash": phash,
        "size": encoded.len(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    const MULTIPART: &str = "From: alice@example.com\r\n\
To: bob@example.com\r\n\
Subject: Report\r\n\
Date: Tue, 1 Jul 2025 10:00:00 +0000\r\n\
MIME-Version: 1.0\r\n\
Content-Type: multipart/mixed; boundary=\"XYZ\"\r\n\
\r\n\
--XYZ\r\n\
Content-Type: text/plain\r\n\
\r\n\
See attached.\r\n\
--XYZ\r\n\
Content-Type: text/plain; name=\"x.txt\"\r\n\
Content-Disposition: attachment; filename=\"x.txt\"\r\n\
Content-Transfer-Encoding: base64\r\n\
\r\n\
aGVsbG8=\r\n\
--XYZ--\r\n";

    fn mailbox() -> MailboxRecord {
        MailboxRecord {
            name: "INBOX".to_string(),
            uuid: Uuid::new_v4(),
            last_uid: 0,
        }
    }

    #[test]
    fn test_documents_for_multipart_mail() {
        let mail = InputMail::from_raw(MULTIPART.as_bytes()).unwrap();
        let docs = mail.documents_for_save(7, &mailbox());

        assert_eq!(docs.len(), 4);
        assert_eq!(docs[0]["type"], "flags");
        assert_eq!(docs[0]["uid"], 7);
        assert_eq!(docs[0]["recent"], true);
        assert_eq!(docs[1]["type"], "head");
        assert_eq!(docs[1]["multi"], true);
        assert_eq!(docs[1]["subject"], "Report");
        assert_eq!(docs[1]["part_map"]["2"]["phash"], docs[3]["phash"]);
        assert_eq!(docs[3]["content-transfer-encoding"], "base64");
        assert_eq!(mail.ident().as_str(), mail.chash());
    }

    #[test]
    fn test_single_part_mail() {
        let raw = "Subject: hi\r\n\r\nhello there\r\n";
        let mail = InputMail::from_raw(raw.as_bytes()).unwrap();
        let docs = mail.documents_for_save(1, &mailbox());

        assert_eq!(docs.len(), 3);
        assert_eq!(docs[1]["multi"], false);
        assert_eq!(docs[1]["phash"], docs[2]["phash"]);
        assert_eq!(docs[2]["raw"].as_str().map(str::trim_end), Some("hello there"));
    }

    #[test]
    fn test_identical_bodies_share_one_document() {
        let raw = "Content-Type: multipart/mixed; boundary=\"B\"\r\n\r\n\
--B\r\n\r\nsame\r\n--B\r\n\r\nsame\r\n--B--\r\n";
        let mail = InputMail::from_raw(raw.as_bytes()).unwrap();

        let hashes = mail.payload_hashes();
        assert_eq!(hashes.len(), 2);
        assert_eq!(hashes[0], hashes[1]);
        assert_eq!(mail.documents_for_save(1, &mailbox()).len(), 3);
    }

    #[test]
    fn test_binary_body_is_stored_as_base64() {
        let mut raw = b"Content-Type: application/octet-stream\r\n\
Content-Transfer-Encoding: binary\r\n\r\n"
            .to_vec();
        raw.extend_from_slice(&[0xff, 0xfe, 0x00, 0x41]);
        let mail = InputMail::from_raw(&raw).unwrap();
        let docs = mail.documents_for_save(1, &mailbox());

        assert_eq!(docs[2]["content-transfer-encoding"], "base64");
        let decoded =
            content::decode_named(docs[2]["raw"].as_str().unwrap().as_bytes(), Some("base64"))
                .unwrap();
        assert_eq!(decoded, vec![0xff, 0xfe, 0x00, 0x41]);
    }

    #[test]
    fn test_date_is_parsed() {
        let mail = InputMail::from_raw(MULTIPART.as_bytes()).unwrap();
        assert_eq!(
            mail.date().map(|d| d.to_rfc3339()),
            Some("2025-07-01T10:00:00+00:00".to_string())
        );
    }
}
