//! Head descriptors: the MIME structure of a stored message
//!
//! A head document describes a message without its body bytes. Multipart
//! nodes carry a `part_map` from part number to nested node; leaf nodes
//! point at a body document through their `phash`.

use serde::Deserialize;
use serde_json::{Map, Value};

use crate::docstore::Document;
use crate::error::Result;
use crate::types::Headers;

/// A leaf body part
#[derive(Debug, Clone, PartialEq, Default)]
pub struct LeafPart {
    pub phash: Option<String>,
    pub ctype: Option<String>,
    pub headers: Headers,
}

impl LeafPart {
    pub fn content_disposition(&self) -> Option<&str> {
        self.headers.get("Content-Disposition")
    }

    pub fn transfer_encoding(&self) -> Option<&str> {
        self.headers.get("Content-Transfer-Encoding")
    }
}

/// One node of the part tree
#[derive(Debug, Clone, PartialEq)]
pub enum PartNode {
    Leaf(LeafPart),
    Multipart {
        ctype: Option<String>,
        headers: Headers,
        /// Children in declared part-map order
        children: Vec<(String, PartNode)>,
    },
}

impl PartNode {
    /// Leaves in depth-first, declared order
    pub fn leaves(&self) -> Vec<&LeafPart> {
        let mut leaves = Vec::new();
        self.collect_leaves(&mut leaves);
        leaves
    }

    fn collect_leaves<'a>(&'a self, out: &mut Vec<&'a LeafPart>) {
        match self {
            PartNode::Leaf(leaf) => out.push(leaf),
            PartNode::Multipart { children, .. } => {
                for (_, child) in children {
                    child.collect_leaves(out);
                }
            }
        }
    }

    pub fn is_multipart(&self) -> bool {
        matches!(self, PartNode::Multipart { .. })
    }
}

#[derive(Deserialize)]
struct RawPart {
    #[serde(default)]
    multi: bool,
    #[serde(default)]
    ctype: Option<String>,
    #[serde(default)]
    phash: Option<String>,
    #[serde(default)]
    headers: Option<Headers>,
    #[serde(default)]
    part_map: Option<Map<String, Value>>,
}

impl RawPart {
    fn into_node(self) -> Result<PartNode> {
        let headers = self.headers.unwrap_or_default();

        // A part map implies multipart even when the flag is missing
        if self.multi || self.part_map.is_some() {
            let mut children = Vec::new();
            for (number, child) in self.part_map.unwrap_or_default() {
                let child: RawPart = serde_json::from_value(child)?;
                children.push((number, child.into_node()?));
            }
            return Ok(PartNode::Multipart {
                ctype: self.ctype,
                headers,
                children,
            });
        }

        Ok(PartNode::Leaf(LeafPart {
            phash: self.phash.filter(|h| !h.is_empty()),
            ctype: self.ctype,
            headers,
        }))
    }
}

/// The head of one stored message
#[derive(Debug, Clone, PartialEq)]
pub struct HeadDescriptor {
    pub chash: Option<String>,
    pub headers: Headers,
    pub root: PartNode,
}

impl HeadDescriptor {
    /// Interpret a head document's JSON content
    pub fn from_value(value: &Value) -> Result<Self> {
        let chash = value
            .get("chash")
            .and_then(Value::as_str)
            .map(str::to_string);
        let raw: RawPart = serde_json::from_value(value.clone())?;
        let root = raw.into_node()?;
        let headers = match &root {
            PartNode::Leaf(leaf) => leaf.headers.clone(),
            PartNode::Multipart { headers, .. } => headers.clone(),
        };

        Ok(Self {
            chash,
            headers,
            root,
        })
    }

    pub fn from_document(doc: &Document) -> Result<Self> {
        Self::from_value(&doc.content)
    }
}
