//! Xylograph triple store
//!
//! Just enough graph-store semantics for the emission engine: insert a
//! triple, test containment, iterate — plus a binary on-disk image and a
//! directory-backed open/flush wrapper (`persist`).
//!
//! Layout follows the usual compact-KG recipe:
//!
//! 1. **String interning**: every IRI stored once, referenced by u32 id
//! 2. **Literal table**: deduplicated literal terms, referenced by u32 id
//! 3. **Bitmap type index**: `rdf:type` membership as Roaring bitmaps
//! 4. **Forward/backward indexes**: (subject, predicate) and
//!    (object, predicate) to triple ids
//!
//! Insertion order is preserved and observable through [`TripleStore::iter`];
//! the emitter relies on that for its ordering guarantees.

pub mod persist;

use anyhow::Result;
use dashmap::DashMap;
use roaring::RoaringBitmap;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU32, Ordering};

pub use persist::{PersistentStore, STORE_FILE};

// ============================================================================
// RDF vocabulary
// ============================================================================

pub const RDF_TYPE: &str = "http://www.w3.org/1999/02/22-rdf-syntax-ns#type";
pub const RDF_PROPERTY: &str = "http://www.w3.org/1999/02/22-rdf-syntax-ns#Property";
pub const RDFS_CLASS: &str = "http://www.w3.org/2000/01/rdf-schema#Class";
pub const RDFS_LABEL: &str = "http://www.w3.org/2000/01/rdf-schema#label";
pub const RDFS_DOMAIN: &str = "http://www.w3.org/2000/01/rdf-schema#domain";
pub const RDFS_RANGE: &str = "http://www.w3.org/2000/01/rdf-schema#range";
pub const RDFS_LITERAL: &str = "http://www.w3.org/2000/01/rdf-schema#Literal";
pub const XSD_STRING: &str = "http://www.w3.org/2001/XMLSchema#string";

/// Last path-ish segment of an IRI, for display.
pub fn local_name(iri: &str) -> &str {
    iri.rsplit(['#', '/']).next().unwrap_or(iri)
}

// ============================================================================
// Terms
// ============================================================================

/// Interned IRI id (4 bytes instead of 24+ for String).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(transparent)]
pub struct TermId(u32);

impl TermId {
    pub const fn new(raw: u32) -> Self {
        Self(raw)
    }

    pub const fn raw(self) -> u32 {
        self.0
    }
}

/// A literal term: lexical form plus optional datatype/language.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Literal {
    pub lexical: String,
    pub datatype: Option<String>,
    pub language: Option<String>,
}

impl Literal {
    pub fn plain(lexical: impl Into<String>) -> Self {
        Self {
            lexical: lexical.into(),
            datatype: None,
            language: None,
        }
    }

    pub fn string(lexical: impl Into<String>) -> Self {
        Self {
            lexical: lexical.into(),
            datatype: Some(XSD_STRING.to_string()),
            language: None,
        }
    }
}

/// Object position of a triple, in resolved (API) form.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Object {
    Iri(String),
    Literal(Literal),
}

impl Object {
    pub fn iri(value: impl Into<String>) -> Self {
        Object::Iri(value.into())
    }

    pub fn literal(value: impl Into<String>) -> Self {
        Object::Literal(Literal::string(value))
    }
}

/// Object position in interned form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ObjRef {
    Resource(TermId),
    Literal(u32),
}

/// One interned triple.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Triple {
    pub subject: TermId,
    pub predicate: TermId,
    pub object: ObjRef,
}

/// A triple with resolved strings, for iteration and display.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TripleView {
    pub subject: String,
    pub predicate: String,
    pub object: Object,
}

// ============================================================================
// IRI interning
// ============================================================================

/// Two-way IRI interner.
#[derive(Debug)]
pub struct TermInterner {
    iri_to_id: DashMap<String, TermId>,
    id_to_iri: DashMap<TermId, String>,
    next_id: AtomicU32,
}

impl TermInterner {
    pub fn new() -> Self {
        Self {
            iri_to_id: DashMap::new(),
            id_to_iri: DashMap::new(),
            next_id: AtomicU32::new(0),
        }
    }

    /// Intern an IRI, returning its id.
    pub fn intern(&self, iri: &str) -> TermId {
        if let Some(id) = self.iri_to_id.get(iri) {
            return *id;
        }

        let id = TermId(self.next_id.fetch_add(1, Ordering::SeqCst));
        self.iri_to_id.insert(iri.to_string(), id);
        self.id_to_iri.insert(id, iri.to_string());
        id
    }

    /// Look up an existing id without inserting.
    pub fn id_of(&self, iri: &str) -> Option<TermId> {
        self.iri_to_id.get(iri).map(|id| *id)
    }

    pub fn lookup(&self, id: TermId) -> Option<String> {
        self.id_to_iri.get(&id).map(|s| s.clone())
    }

    pub fn len(&self) -> usize {
        self.next_id.load(Ordering::SeqCst) as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let iris: Vec<String> = (0..self.next_id.load(Ordering::SeqCst))
            .filter_map(|i| self.id_to_iri.get(&TermId(i)).map(|s| s.clone()))
            .collect();
        bincode::serialize(&iris).unwrap_or_default()
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let iris: Vec<String> = bincode::deserialize(bytes)?;
        let interner = Self::new();
        for iri in iris {
            interner.intern(&iri);
        }
        Ok(interner)
    }
}

impl Default for TermInterner {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Triple store
// ============================================================================

/// In-memory triple store with interned terms and bitmap type index.
#[derive(Debug)]
pub struct TripleStore {
    interner: TermInterner,
    /// Literal table; ids index into it.
    literals: Vec<Literal>,
    literal_ids: HashMap<Literal, u32>,
    /// All triples, insertion order.
    triples: Vec<Triple>,
    seen: HashSet<Triple>,
    /// (subject, predicate) -> triple ids
    forward: HashMap<(TermId, TermId), Vec<u32>>,
    /// (object resource, predicate) -> triple ids
    backward: HashMap<(TermId, TermId), Vec<u32>>,
    /// class -> bitmap of subject term ids
    type_index: HashMap<TermId, RoaringBitmap>,
}

impl TripleStore {
    pub fn new() -> Self {
        Self {
            interner: TermInterner::new(),
            literals: Vec::new(),
            literal_ids: HashMap::new(),
            triples: Vec::new(),
            seen: HashSet::new(),
            forward: HashMap::new(),
            backward: HashMap::new(),
            type_index: HashMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.triples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.triples.is_empty()
    }

    fn intern_object(&mut self, object: &Object) -> ObjRef {
        match object {
            Object::Iri(iri) => ObjRef::Resource(self.interner.intern(iri)),
            Object::Literal(lit) => {
                if let Some(&id) = self.literal_ids.get(lit) {
                    return ObjRef::Literal(id);
                }
                let id = self.literals.len() as u32;
                self.literals.push(lit.clone());
                self.literal_ids.insert(lit.clone(), id);
                ObjRef::Literal(id)
            }
        }
    }

    /// Insert a triple. Returns true when it was not present before.
    pub fn insert(&mut self, subject: &str, predicate: &str, object: Object) -> bool {
        let triple = Triple {
            subject: self.interner.intern(subject),
            predicate: self.interner.intern(predicate),
            object: self.intern_object(&object),
        };
        if !self.seen.insert(triple) {
            return false;
        }

        let id = self.triples.len() as u32;
        self.forward
            .entry((triple.subject, triple.predicate))
            .or_default()
            .push(id);
        if let ObjRef::Resource(obj) = triple.object {
            self.backward
                .entry((obj, triple.predicate))
                .or_default()
                .push(id);
            if predicate == RDF_TYPE {
                self.type_index
                    .entry(obj)
                    .or_default()
                    .insert(triple.subject.raw());
            }
        }
        self.triples.push(triple);
        true
    }

    /// Containment test. Never interns.
    pub fn contains(&self, subject: &str, predicate: &str, object: &Object) -> bool {
        let (Some(subject), Some(predicate)) =
            (self.interner.id_of(subject), self.interner.id_of(predicate))
        else {
            return false;
        };
        let object = match object {
            Object::Iri(iri) => match self.interner.id_of(iri) {
                Some(id) => ObjRef::Resource(id),
                None => return false,
            },
            Object::Literal(lit) => match self.literal_ids.get(lit) {
                Some(&id) => ObjRef::Literal(id),
                None => return false,
            },
        };
        self.seen.contains(&Triple {
            subject,
            predicate,
            object,
        })
    }

    fn resolve(&self, triple: &Triple) -> Option<TripleView> {
        let subject = self.interner.lookup(triple.subject)?;
        let predicate = self.interner.lookup(triple.predicate)?;
        let object = match triple.object {
            ObjRef::Resource(id) => Object::Iri(self.interner.lookup(id)?),
            ObjRef::Literal(id) => Object::Literal(self.literals.get(id as usize)?.clone()),
        };
        Some(TripleView {
            subject,
            predicate,
            object,
        })
    }

    /// All triples in insertion order, resolved.
    pub fn iter(&self) -> impl Iterator<Item = TripleView> + '_ {
        self.triples.iter().filter_map(|t| self.resolve(t))
    }

    /// Objects of (subject, predicate), insertion order.
    pub fn objects(&self, subject: &str, predicate: &str) -> Vec<Object> {
        let (Some(s), Some(p)) = (self.interner.id_of(subject), self.interner.id_of(predicate))
        else {
            return Vec::new();
        };
        let Some(ids) = self.forward.get(&(s, p)) else {
            return Vec::new();
        };
        ids.iter()
            .filter_map(|&id| self.triples.get(id as usize))
            .filter_map(|t| match t.object {
                ObjRef::Resource(o) => self.interner.lookup(o).map(Object::Iri),
                ObjRef::Literal(o) => self.literals.get(o as usize).cloned().map(Object::Literal),
            })
            .collect()
    }

    /// Subjects declared with `rdf:type <class_iri>`, in interning order.
    pub fn subjects_of_type(&self, class_iri: &str) -> Vec<String> {
        let Some(class_id) = self.interner.id_of(class_iri) else {
            return Vec::new();
        };
        let Some(bitmap) = self.type_index.get(&class_id) else {
            return Vec::new();
        };
        bitmap
            .iter()
            .filter_map(|raw| self.interner.lookup(TermId(raw)))
            .collect()
    }

    /// (class IRI, member count) pairs, sorted by class IRI.
    pub fn type_counts(&self) -> Vec<(String, u64)> {
        let mut out: Vec<(String, u64)> = self
            .type_index
            .iter()
            .filter_map(|(class, bitmap)| {
                self.interner.lookup(*class).map(|iri| (iri, bitmap.len()))
            })
            .collect();
        out.sort();
        out
    }

    // ========================================================================
    // Serialization
    // ========================================================================

    /// Serialize to the binary image format.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let interner_bytes = self.interner.to_bytes();
        let body_bytes = bincode::serialize(&(
            &self.literals,
            &self.literal_ids,
            &self.triples,
            &self.seen,
            &self.forward,
            &self.backward,
            &self.type_index,
        ))?;

        let mut result = Vec::new();
        // Header: magic number + version
        result.extend_from_slice(b"XYGS"); // Xylograph Store
        result.extend_from_slice(&1u32.to_le_bytes()); // version 1

        // Interner
        result.extend_from_slice(&(interner_bytes.len() as u64).to_le_bytes());
        result.extend_from_slice(&interner_bytes);

        // Body
        result.extend_from_slice(&(body_bytes.len() as u64).to_le_bytes());
        result.extend_from_slice(&body_bytes);

        Ok(result)
    }

    /// Deserialize from the binary image format. Truncated or corrupt
    /// images are errors, never panics: a torn write must not wedge every
    /// later open of the same directory.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        // Check header
        if bytes.len() < 8 || &bytes[0..4] != b"XYGS" {
            return Err(anyhow::anyhow!("Invalid store image"));
        }

        let version = u32::from_le_bytes(bytes[4..8].try_into()?);
        if version != 1 {
            return Err(anyhow::anyhow!("Unsupported store version: {}", version));
        }

        let mut offset = 8;

        // Interner
        let interner_len = u64::from_le_bytes(section(bytes, offset, 8)?.try_into()?) as usize;
        offset += 8;
        let interner = TermInterner::from_bytes(section(bytes, offset, interner_len)?)?;
        offset += interner_len;

        // Body
        let body_len = u64::from_le_bytes(section(bytes, offset, 8)?.try_into()?) as usize;
        offset += 8;
        #[allow(clippy::type_complexity)]
        let (literals, literal_ids, triples, seen, forward, backward, type_index): (
            Vec<Literal>,
            HashMap<Literal, u32>,
            Vec<Triple>,
            HashSet<Triple>,
            HashMap<(TermId, TermId), Vec<u32>>,
            HashMap<(TermId, TermId), Vec<u32>>,
            HashMap<TermId, RoaringBitmap>,
        ) = bincode::deserialize(section(bytes, offset, body_len)?)?;

        Ok(Self {
            interner,
            literals,
            literal_ids,
            triples,
            seen,
            forward,
            backward,
            type_index,
        })
    }
}

impl Default for TripleStore {
    fn default() -> Self {
        Self::new()
    }
}

/// Bounds-checked slice of an image section. `checked_add` keeps a hostile
/// length prefix from overflowing the range arithmetic.
fn section(bytes: &[u8], offset: usize, len: usize) -> Result<&[u8]> {
    offset
        .checked_add(len)
        .and_then(|end| bytes.get(offset..end))
        .ok_or_else(|| anyhow::anyhow!("Truncated store image"))
}
