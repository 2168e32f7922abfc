//! Tests for rebuilding messages from head and body documents

use cairn::docstore::r#impl::InMemoryDocumentStore;
use cairn::{BodyDocumentIndex, DocumentStore, HeadDescriptor, MessageAssembler};
use serde_json::{json, Value};
use std::sync::Arc;

async fn assembler_with(bodies: Vec<Value>) -> MessageAssembler {
    let store = Arc::new(InMemoryDocumentStore::new());
    for body in bodies {
        store.create_doc(body).await.unwrap();
    }
    MessageAssembler::new(BodyDocumentIndex::new(store))
}

fn body(phash: &str, raw: &str) -> Value {
    json!({"type": "cnt", "phash": phash, "raw": raw})
}

fn head(value: Value) -> HeadDescriptor {
    HeadDescriptor::from_value(&value).unwrap()
}

#[tokio::test]
async fn test_plain_part_and_named_attachment() {
    let assembler = assembler_with(vec![body("H1", "hello"), body("H2", "attached")]).await;
    let head = head(json!({
        "multi": true,
        "part_map": {
            "1": {"multi": false, "phash": "H1", "headers": {}},
            "2": {
                "multi": false,
                "phash": "H2",
                "headers": {"Content-Disposition": "attachment; filename=x.txt"}
            }
        }
    }));

    let message = assembler.assemble(&head).await.unwrap();

    assert_eq!(message.alternatives.len(), 1);
    assert_eq!(message.alternatives[0].content, "hello");
    assert_eq!(message.alternatives[0].ctype, "text/plain");
    assert_eq!(message.attachments.len(), 1);
    assert_eq!(message.attachments[0].name, "x.txt");
    assert_eq!(message.attachments[0].ident, "H2");
}

#[tokio::test]
async fn test_multipart_without_part_map_is_empty() {
    let assembler = assembler_with(vec![body("H1", "hello")]).await;

    let message = assembler.assemble(&head(json!({"multi": true}))).await.unwrap();

    assert!(message.is_empty());
}

#[tokio::test]
async fn test_part_without_headers_is_alternative() {
    let assembler = assembler_with(vec![body("H1", "no headers here")]).await;

    let message = assembler
        .assemble(&head(json!({"multi": false, "phash": "H1"})))
        .await
        .unwrap();

    assert_eq!(message.alternatives.len(), 1);
    assert!(message.alternatives[0].headers.is_empty());
    assert!(message.attachments.is_empty());
}

#[tokio::test]
async fn test_nested_alternatives_and_attachment() {
    let assembler = assembler_with(vec![
        body("TXT", "plain text"),
        json!({
            "type": "cnt",
            "phash": "HTML",
            "raw": "PHA+aHRtbDwvcD4=",
            "content-type": "text/html",
            "content-transfer-encoding": "base64"
        }),
        json!({
            "type": "cnt",
            "phash": "PDF",
            "raw": "JVBERi0="
        }),
    ])
    .await;
    let head = head(json!({
        "multi": true,
        "headers": {"Subject": "report"},
        "part_map": {
            "1": {
                "multi": true,
                "part_map": {
                    "1": {"multi": false, "phash": "TXT", "headers": {"Content-Type": "text/plain"}},
                    "2": {
                        "multi": false,
                        "phash": "HTML",
                        "headers": {"Content-Type": "text/html"}
                    }
                }
            },
            "2": {
                "multi": false,
                "phash": "PDF",
                "headers": {
                    "Content-Type": "application/pdf; name=\"report.pdf\"",
                    "Content-Transfer-Encoding": "base64"
                }
            }
        }
    }));

    let message = assembler.assemble(&head).await.unwrap();

    let contents: Vec<_> = message
        .alternatives
        .iter()
        .map(|alt| (alt.ctype.as_str(), alt.content.as_str()))
        .collect();
    assert_eq!(
        contents,
        vec![("text/plain", "plain text"), ("text/html", "<p>html</p>")]
    );

    assert_eq!(message.attachments.len(), 1);
    let attachment = &message.attachments[0];
    assert_eq!(attachment.ident, "PDF");
    assert_eq!(attachment.name, "report.pdf");
    assert!(attachment.ctype.starts_with("application/pdf"));
    assert_eq!(attachment.encoding.as_deref(), Some("base64"));
}

#[tokio::test]
async fn test_unresolved_part_is_skipped() {
    let assembler = assembler_with(vec![body("H1", "kept")]).await;
    let head = head(json!({
        "multi": true,
        "part_map": {
            "1": {"multi": false, "phash": "MISSING"},
            "2": {"multi": false, "phash": ""},
            "3": {"multi": false, "phash": "H1"}
        }
    }));

    let message = assembler.assemble(&head).await.unwrap();

    assert_eq!(message.alternatives.len(), 1);
    assert_eq!(message.alternatives[0].content, "kept");
}

#[tokio::test]
async fn test_undecodable_part_is_skipped() {
    let assembler = assembler_with(vec![
        json!({
            "type": "cnt",
            "phash": "BROKEN",
            "raw": "!!! not base64 !!!",
            "content-transfer-encoding": "base64"
        }),
        body("OK", "fine"),
    ])
    .await;
    let head = head(json!({
        "multi": true,
        "part_map": {
            "1": {"multi": false, "phash": "BROKEN"},
            "2": {"multi": false, "phash": "OK"}
        }
    }));

    let message = assembler.assemble(&head).await.unwrap();

    assert_eq!(message.alternatives.len(), 1);
    assert_eq!(message.alternatives[0].content, "fine");
}

#[tokio::test]
async fn test_attachment_decodes_base64() {
    let assembler = assembler_with(vec![json!({
        "type": "cnt",
        "phash": "B64",
        "raw": "ZXNzZSBwYXBvIHNldSB0YSBxdWFscXVlciBjb2lzYQ==",
        "content-type": "text/plain",
        "content-transfer-encoding": "base64"
    })])
    .await;

    let content = assembler.attachment("B64", None).await.unwrap().unwrap();

    assert_eq!(content.content, b"esse papo seu ta qualquer coisa".to_vec());
    assert_eq!(content.content_type, "text/plain");
}

#[tokio::test]
async fn test_attachment_declared_encoding_wins() {
    let assembler = assembler_with(vec![body("QP", "esse papo seu ta qualquer=\r\n coisa")]).await;

    let content = assembler
        .attachment("QP", Some("quoted-printable"))
        .await
        .unwrap()
        .unwrap();

    assert_eq!(content.content, b"esse papo seu ta qualquer coisa".to_vec());
}

#[tokio::test]
async fn test_attachment_unknown_hash() {
    let assembler = assembler_with(Vec::new()).await;

    assert!(assembler.attachment("NOPE", None).await.unwrap().is_none());
    assert!(assembler.attachment("", None).await.unwrap().is_none());
}

#[tokio::test]
async fn test_alternative_is_decoded_in_its_charset() {
    let assembler = assembler_with(vec![json!({
        "type": "cnt",
        "phash": "LATIN1",
        "raw": "caf=E9",
        "content-type": "text/plain; charset=iso-8859-1",
        "content-transfer-encoding": "quoted-printable"
    })])
    .await;

    let message = assembler
        .assemble(&head(json!({"multi": false, "phash": "LATIN1"})))
        .await
        .unwrap();

    assert_eq!(message.alternatives.len(), 1);
    assert_eq!(message.alternatives[0].content, "café");
}
