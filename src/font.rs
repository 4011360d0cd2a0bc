//! Font lookup for text watermarks.
//!
//! A font is named either by a path to a font file or by a family name. Family
//! names are matched against the names stored inside the installed fonts, so
//! `"Noto Sans CJK JP"` finds its face inside `NotoSansCJK-Regular.ttc`.

use std::path::Path;

use ab_glyph::FontVec;
use fontdb::{Database, Family, Query, ID};
use tracing::{debug, warn};

use crate::error::{Error, Result};

/// Families tried, in order, when fallback is allowed.
const FALLBACK_FAMILIES: &[&str] = &[
    "DejaVu Sans",
    "Liberation Sans",
    "Arial",
    "Helvetica",
    "Noto Sans",
    "Open Sans",
];

/// Load a font by path or family name.
///
/// When `allow_fallback` is set and `name` cannot be resolved, a default
/// system font is used instead.
///
/// # Errors
///
/// Returns [`Error::FontLoad`] if no usable font is found.
pub fn load_font(name: &str, allow_fallback: bool) -> Result<FontVec> {
    let path = Path::new(name);
    if path.is_file() {
        return read_font_file(path).ok_or_else(|| Error::FontLoad(name.to_string()));
    }

    let db = system_fonts();
    if let Some(id) = find_family(&db, name) {
        return load_face(&db, id).ok_or_else(|| Error::FontLoad(name.to_string()));
    }

    if allow_fallback {
        if let Some(id) = fallback_face(&db) {
            warn!(requested = name, "font not found, using fallback");
            return load_face(&db, id).ok_or_else(|| Error::FontLoad(name.to_string()));
        }
    }

    Err(Error::FontLoad(name.to_string()))
}

/// A database of every font installed on this machine.
#[must_use]
pub fn system_fonts() -> Database {
    let mut db = Database::new();
    db.load_system_fonts();
    debug!(faces = db.len(), "loaded system font database");
    db
}

/// Best regular face of `family`, matched exactly first and then ignoring case.
fn find_family(db: &Database, family: &str) -> Option<ID> {
    let family = family.trim();
    if family.is_empty() {
        return None;
    }
    let query = Query {
        families: &[Family::Name(family)],
        ..Query::default()
    };
    db.query(&query).or_else(|| {
        db.faces()
            .find(|face| {
                face.families
                    .iter()
                    .any(|(name, _)| name.eq_ignore_ascii_case(family))
            })
            .map(|face| face.id)
    })
}

fn fallback_face(db: &Database) -> Option<ID> {
    FALLBACK_FAMILIES
        .iter()
        .find_map(|family| find_family(db, family))
        .or_else(|| db.faces().next().map(|face| face.id))
}

fn load_face(db: &Database, id: ID) -> Option<FontVec> {
    match db.with_face_data(id, |data, index| {
        FontVec::try_from_vec_and_index(data.to_vec(), index)
    })? {
        Ok(font) => Some(font),
        Err(e) => {
            warn!("failed to parse font face: {e}");
            None
        }
    }
}

fn read_font_file(path: &Path) -> Option<FontVec> {
    let data = match std::fs::read(path) {
        Ok(data) => data,
        Err(e) => {
            warn!(path = %path.display(), "failed to read font: {e}");
            return None;
        }
    };
    match FontVec::try_from_vec(data) {
        Ok(font) => {
            debug!(path = %path.display(), "loaded font");
            Some(font)
        }
        Err(e) => {
            warn!(path = %path.display(), "failed to parse font: {e}");
            None
        }
    }
}
