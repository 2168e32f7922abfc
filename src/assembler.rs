//! Reassembly of stored messages from their document graph
//!
//! A message is kept as a head document plus one body document per leaf
//! part. The assembler walks the head's part tree, resolves each leaf's body
//! through the [`BodyDocumentIndex`], decodes it and sorts it into body
//! alternatives or named attachments.

use futures::future::join_all;
use mailparse::DispositionType;

use crate::body::{BodyDocument, BodyDocumentIndex};
use crate::content::{self, TransferEncoding};
use crate::error::Result;
use crate::head::{HeadDescriptor, LeafPart, PartNode};
use crate::types::Headers;

const DEFAULT_CONTENT_TYPE: &str = "text/plain";

/// An inline body part
#[derive(Debug, Clone, PartialEq)]
pub struct Alternative {
    pub headers: Headers,
    /// Decoded content
    pub content: String,
    pub ctype: String,
}

/// A named, non-inline body part
///
/// Content is not carried here; fetch it with
/// [`MessageAssembler::attachment`] using `ident`.
#[derive(Debug, Clone, PartialEq)]
pub struct Attachment {
    pub headers: Headers,
    /// Payload hash of the part
    pub ident: String,
    pub name: String,
    pub ctype: String,
    pub encoding: Option<String>,
}

/// Decoded attachment bytes
#[derive(Debug, Clone, PartialEq)]
pub struct AttachmentContent {
    pub content: Vec<u8>,
    pub content_type: String,
}

/// Classified parts of one message
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReconstructedMessage {
    pub alternatives: Vec<Alternative>,
    pub attachments: Vec<Attachment>,
}

impl ReconstructedMessage {
    pub fn is_empty(&self) -> bool {
        self.alternatives.is_empty() && self.attachments.is_empty()
    }
}

/// How a leaf presents itself
#[derive(Debug, PartialEq)]
enum Classification {
    Alternative,
    Attachment { name: String },
}

/// Attachment when the disposition says so, or when the part is named and
/// not explicitly inline
fn classify(disposition: Option<&str>, ctype: &str) -> Classification {
    let parsed = disposition.map(mailparse::parse_content_disposition);

    let filename = parsed
        .as_ref()
        .and_then(|d| d.params.get("filename").cloned())
        .filter(|name| !name.is_empty());
    let type_name = mailparse::parse_content_type(ctype)
        .params
        .get("name")
        .cloned()
        .filter(|name| !name.is_empty());
    let name = filename.or(type_name);

    match parsed.map(|d| d.disposition) {
        Some(DispositionType::Attachment) => Classification::Attachment {
            name: name.unwrap_or_default(),
        },
        Some(DispositionType::Inline) => Classification::Alternative,
        _ => match name {
            Some(name) => Classification::Attachment { name },
            None => Classification::Alternative,
        },
    }
}

/// Builds [`ReconstructedMessage`]s from head descriptors
///
/// Holds no mutable state; one assembler serves concurrent reads.
#[derive(Clone)]
pub struct MessageAssembler {
    bodies: BodyDocumentIndex,
}

impl MessageAssembler {
    pub fn new(bodies: BodyDocumentIndex) -> Self {
        Self { bodies }
    }

    pub async fn assemble(&self, head: &HeadDescriptor) -> Result<ReconstructedMessage> {
        self.assemble_node(&head.root).await
    }

    pub async fn assemble_node(&self, root: &PartNode) -> Result<ReconstructedMessage> {
        let leaves = root.leaves();
        let lookups = leaves
            .iter()
            .map(|leaf| self.bodies.lookup_by_hash(leaf.phash.as_deref()));
        let bodies = join_all(lookups).await;

        let mut message = ReconstructedMessage::default();
        for (leaf, body) in leaves.into_iter().zip(bodies) {
            match body? {
                Some(body) => Self::add_part(&mut message, leaf, body),
                None => {
                    if let Some(phash) = &leaf.phash {
                        log::debug!("No body document for part {}, skipping", phash);
                    }
                }
            }
        }

        Ok(message)
    }

    fn add_part(message: &mut ReconstructedMessage, leaf: &LeafPart, body: BodyDocument) {
        let encoding = body
            .transfer_encoding
            .clone()
            .or_else(|| leaf.transfer_encoding().map(str::to_string));
        let ctype = body
            .content_type
            .clone()
            .or_else(|| leaf.ctype.clone())
            .or_else(|| leaf.headers.get("Content-Type").map(str::to_string))
            .unwrap_or_else(|| DEFAULT_CONTENT_TYPE.to_string());
        let disposition = leaf.content_disposition().or(body.disposition.as_deref());

        match classify(disposition, &ctype) {
            Classification::Attachment { name } => message.attachments.push(Attachment {
                headers: leaf.headers.clone(),
                ident: body.phash,
                name,
                ctype,
                encoding,
            }),
            Classification::Alternative => {
                let encoding = TransferEncoding::parse(encoding.as_deref());
                match content::decode(body.raw.as_bytes(), &encoding) {
                    Ok(bytes) => {
                        let charset = mailparse::parse_content_type(&ctype).charset;
                        message.alternatives.push(Alternative {
                            headers: leaf.headers.clone(),
                            content: content::decode_text(&bytes, &charset),
                            ctype,
                        })
                    }
                    Err(e) => {
                        log::warn!("Skipping part {}: {}", body.phash, e);
                    }
                }
            }
        }
    }

    /// Decoded content of the body stored under `phash`
    ///
    /// `encoding` is the caller's declared transfer encoding; when absent,
    /// the encoding recorded on the body document applies.
    pub async fn attachment(
        &self,
        phash: &str,
        encoding: Option<&str>,
    ) -> Result<Option<AttachmentContent>> {
        let body = match self.bodies.lookup_by_hash(Some(phash)).await? {
            Some(body) => body,
            None => return Ok(None),
        };

        let encoding = encoding.or(body.transfer_encoding.as_deref());
        let content = content::decode_named(body.raw.as_bytes(), encoding)?;

        Ok(Some(AttachmentContent {
            content,
            content_type: body
                .content_type
                .unwrap_or_else(|| DEFAULT_CONTENT_TYPE.to_string()),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_attachment_disposition() {
        assert_eq!(
            classify(Some("attachment; filename=x.txt"), "text/plain"),
            Classification::Attachment {
                name: "x.txt".to_string()
            }
        );
        assert_eq!(
            classify(Some("attachment"), "text/plain"),
            Classification::Attachment {
                name: String::new()
            }
        );
    }

    #[test]
    fn test_classify_inline_named_part_is_alternative() {
        assert_eq!(
            classify(Some("inline; filename=\"logo.png\""), "image/png"),
            Classification::Alternative
        );
    }

    #[test]
    fn test_classify_name_from_content_type() {
        assert_eq!(
            classify(None, "application/pdf; name=\"report.pdf\""),
            Classification::Attachment {
                name: "report.pdf".to_string()
            }
        );
        assert_eq!(classify(None, "text/html"), Classification::Alternative);
    }
}
