//! Database models
//!
//! Rust types representing stored notes and the parameters used to list them.
//! All models use serde for serialization to the UI layer.

use crate::error::{AppError, Result};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// Entry id carried by a note that has never been written to the store
pub const UNSAVED_ENTRY_ID: i64 = -1;

/// Kind of note. Codes match the `entries.type` column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NoteType {
    Text,
    Photo,
    Audio,
    Video,
    Map,
}

impl NoteType {
    pub fn code(self) -> i64 {
        match self {
            NoteType::Text => 1,
            NoteType::Photo => 2,
            NoteType::Audio => 3,
            NoteType::Video => 4,
            NoteType::Map => 5,
        }
    }

    pub fn from_code(code: i64) -> Result<Self> {
        match code {
            1 => Ok(NoteType::Text),
            2 => Ok(NoteType::Photo),
            3 => Ok(NoteType::Audio),
            4 => Ok(NoteType::Video),
            5 => Ok(NoteType::Map),
            other => Err(AppError::InvalidArgument(format!(
                "unknown note type code {}",
                other
            ))),
        }
    }

    /// Whether notes of this type keep a row in `resource_entries`
    pub fn has_resource(self) -> bool {
        matches!(self, NoteType::Photo | NoteType::Audio)
    }
}

/// A single note.
///
/// `serialized` is transient: it is true while the in-memory copy matches
/// the stored row. Every setter clears it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "NoteFields")]
pub struct Note {
    entry_id: i64,
    note_type: NoteType,
    mod_time: i64,
    marked: bool,
    title: String,
    text: String,
    resource_path: String,
    #[serde(skip)]
    serialized: bool,
}

/// Wire form of [`Note`], checked before it becomes one
#[derive(Deserialize)]
struct NoteFields {
    #[serde(default = "unsaved_entry_id")]
    entry_id: i64,
    note_type: NoteType,
    #[serde(default)]
    mod_time: i64,
    #[serde(default)]
    marked: bool,
    #[serde(default)]
    title: String,
    #[serde(default)]
    text: String,
    #[serde(default)]
    resource_path: String,
}

fn unsaved_entry_id() -> i64 {
    UNSAVED_ENTRY_ID
}

impl TryFrom<NoteFields> for Note {
    type Error = AppError;

    fn try_from(fields: NoteFields) -> Result<Self> {
        if fields.entry_id < UNSAVED_ENTRY_ID {
            return Err(AppError::InvalidArgument(format!(
                "invalid entry id {}",
                fields.entry_id
            )));
        }

        let mut note = Note::new(fields.note_type);
        note.entry_id = fields.entry_id;
        note.mod_time = fields.mod_time;
        note.marked = fields.marked;
        note.title = fields.title;
        note.text = fields.text;
        if !fields.resource_path.is_empty() {
            note.set_resource_path(fields.resource_path)?;
        }
        Ok(note)
    }
}

impl Note {
    pub fn new(note_type: NoteType) -> Self {
        Self {
            entry_id: UNSAVED_ENTRY_ID,
            note_type,
            mod_time: 0,
            marked: false,
            title: String::new(),
            text: String::new(),
            resource_path: String::new(),
            serialized: false,
        }
    }

    /// Text note with the given title and body
    pub fn new_text(title: impl Into<String>, text: impl Into<String>) -> Self {
        let mut note = Self::new(NoteType::Text);
        note.title = title.into();
        note.text = text.into();
        note
    }

    /// Photo or audio note pointing at a file on disk
    pub fn resource(
        note_type: NoteType,
        title: impl Into<String>,
        resource_path: impl Into<String>,
    ) -> Result<Self> {
        let mut note = Self::new(note_type);
        note.title = title.into();
        note.set_resource_path(resource_path)?;
        Ok(note)
    }

    /// Rebuild a note from a stored row
    pub(crate) fn from_row(
        entry_id: i64,
        note_type: NoteType,
        mod_time: i64,
        marked: bool,
        title: String,
        text: String,
        resource_path: String,
    ) -> Self {
        Self {
            entry_id,
            note_type,
            mod_time,
            marked,
            title,
            text,
            resource_path: if note_type.has_resource() {
                resource_path
            } else {
                String::new()
            },
            serialized: true,
        }
    }

    pub fn entry_id(&self) -> i64 {
        self.entry_id
    }

    pub fn is_saved(&self) -> bool {
        self.entry_id >= 0
    }

    pub fn note_type(&self) -> NoteType {
        self.note_type
    }

    pub fn mod_time(&self) -> i64 {
        self.mod_time
    }

    pub fn marked(&self) -> bool {
        self.marked
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn resource_path(&self) -> &str {
        &self.resource_path
    }

    pub fn is_serialized(&self) -> bool {
        self.serialized
    }

    pub fn set_mod_time(&mut self, mod_time: i64) {
        self.mod_time = mod_time;
        self.serialized = false;
    }

    /// Stamp the modification time with the current time
    pub fn touch(&mut self) {
        self.set_mod_time(Utc::now().timestamp());
    }

    pub fn set_marked(&mut self, marked: bool) {
        self.marked = marked;
        self.serialized = false;
    }

    pub fn set_title(&mut self, title: impl Into<String>) {
        self.title = title.into();
        self.serialized = false;
    }

    pub fn set_text(&mut self, text: impl Into<String>) {
        self.text = text.into();
        self.serialized = false;
    }

    /// Only photo and audio notes carry a resource path.
    pub fn set_resource_path(&mut self, resource_path: impl Into<String>) -> Result<()> {
        if !self.note_type.has_resource() {
            return Err(AppError::InvalidArgument(format!(
                "{:?} notes have no resource path",
                self.note_type
            )));
        }
        self.resource_path = resource_path.into();
        self.serialized = false;
        Ok(())
    }

    pub(crate) fn assign_entry_id(&mut self, entry_id: i64) {
        self.entry_id = entry_id;
    }

    pub(crate) fn set_serialized(&mut self, serialized: bool) {
        self.serialized = serialized;
    }

    /// Field-by-field equality, ignoring the `serialized` flag
    pub fn same_content(&self, other: &Note) -> bool {
        self.entry_id == other.entry_id
            && self.note_type == other.note_type
            && self.mod_time == other.mod_time
            && self.marked == other.marked
            && self.title == other.title
            && self.text == other.text
            && self.resource_path == other.resource_path
    }
}

/// Key used to order notes within the marked and unmarked groups
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortKey {
    #[default]
    Date,
    Title,
    Type,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortOrder {
    Ascending,
    #[default]
    Descending,
}

/// Which field the substring filter is matched against
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterMode {
    #[default]
    ByTitle,
    ByText,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TypeFilter {
    #[default]
    All,
    Only(NoteType),
}

impl TypeFilter {
    /// Numeric form; `All` is 0, otherwise the note type code
    pub fn code(self) -> i64 {
        match self {
            TypeFilter::All => 0,
            TypeFilter::Only(t) => t.code(),
        }
    }

    pub fn from_code(code: i64) -> Result<Self> {
        match code {
            0 => Ok(TypeFilter::All),
            other => NoteType::from_code(other).map(TypeFilter::Only),
        }
    }

    pub fn accepts(self, note_type: NoteType) -> bool {
        match self {
            TypeFilter::All => true,
            TypeFilter::Only(t) => t == note_type,
        }
    }
}

/// Parameters for listing notes
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct NoteQuery {
    pub sort: SortKey,
    pub order: SortOrder,
    pub type_filter: TypeFilter,
    pub filter_mode: FilterMode,
    pub filter_text: String,
}

impl NoteQuery {
    pub fn sorted(sort: SortKey, order: SortOrder) -> Self {
        Self {
            sort,
            order,
            ..Self::default()
        }
    }

    pub fn with_type(mut self, type_filter: TypeFilter) -> Self {
        self.type_filter = type_filter;
        self
    }

    pub fn with_filter(mut self, filter_mode: FilterMode, filter_text: impl Into<String>) -> Self {
        self.filter_mode = filter_mode;
        self.filter_text = filter_text.into();
        self
    }

    /// Predicate implementing the type and substring filters.
    ///
    /// Case folding is ASCII-only, the same as SQLite `UPPER` and `LIKE`,
    /// so cached and stored listings select the same notes.
    pub fn matcher(&self) -> impl Fn(&Note) -> bool + '_ {
        let needle = self.filter_text.to_ascii_lowercase();
        move |note: &Note| {
            if !self.type_filter.accepts(note.note_type()) {
                return false;
            }
            if needle.is_empty() {
                return true;
            }
            let haystack = match self.filter_mode {
                FilterMode::ByTitle => note.title(),
                FilterMode::ByText => note.text(),
            };
            haystack.to_ascii_lowercase().contains(&needle)
        }
    }

    /// `LIKE` pattern for the filter text, with wildcards escaped by `\`
    pub(crate) fn like_pattern(&self) -> Option<String> {
        if self.filter_text.is_empty() {
            return None;
        }
        let mut pattern = String::with_capacity(self.filter_text.len() + 2);
        pattern.push('%');
        for c in self.filter_text.chars() {
            if matches!(c, '%' | '_' | '\\') {
                pattern.push('\\');
            }
            pattern.push(c);
        }
        pattern.push('%');
        Some(pattern)
    }
}

#[derive(Debug, PartialEq, Eq, PartialOrd, Ord)]
enum SortValue<'a> {
    Time(i64),
    Title(&'a str),
    Type(i64),
}

fn sort_value(note: &Note, key: SortKey) -> SortValue<'_> {
    match key {
        SortKey::Date => SortValue::Time(note.mod_time()),
        SortKey::Title => SortValue::Title(note.title()),
        SortKey::Type => SortValue::Type(note.note_type().code()),
    }
}

/// Orders marked notes before unmarked ones, then by `key` in `order`.
/// Ties fall back to ascending entry id.
pub fn compare_notes(a: &Note, b: &Note, key: SortKey, order: SortOrder) -> Ordering {
    let rank = |note: &Note| u8::from(!note.marked());
    rank(a).cmp(&rank(b)).then_with(|| {
        let by_key = sort_value(a, key).cmp(&sort_value(b, key));
        match order {
            SortOrder::Ascending => by_key,
            SortOrder::Descending => by_key.reverse(),
        }
    })
    .then_with(|| a.entry_id().cmp(&b.entry_id()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn note(title: &str, mod_time: i64, marked: bool) -> Note {
        let mut n = Note::new_text(title, "");
        n.set_mod_time(mod_time);
        n.set_marked(marked);
        n
    }

    #[test]
    fn test_new_note_is_unsaved() {
        let n = Note::new_text("A", "hello");
        assert_eq!(n.entry_id(), UNSAVED_ENTRY_ID);
        assert!(!n.is_saved());
        assert!(!n.is_serialized());
        assert_eq!(n.resource_path(), "");
    }

    #[test]
    fn test_setters_clear_serialized() {
        let mut n = Note::from_row(3, NoteType::Text, 10, false, "t".into(), "b".into(), String::new());
        assert!(n.is_serialized());
        n.set_title("changed");
        assert!(!n.is_serialized());
    }

    #[test]
    fn test_resource_path_only_for_resource_types() {
        let mut text = Note::new(NoteType::Text);
        assert!(matches!(
            text.set_resource_path("/tmp/x.jpg"),
            Err(AppError::InvalidArgument(_))
        ));

        let photo = Note::resource(NoteType::Photo, "Cat", "/Media/cat.jpg").unwrap();
        assert_eq!(photo.resource_path(), "/Media/cat.jpg");

        let from_row = Note::from_row(1, NoteType::Text, 0, false, "t".into(), "".into(), "junk".into());
        assert_eq!(from_row.resource_path(), "");
    }

    #[test]
    fn test_type_codes_round_trip() {
        for t in [NoteType::Text, NoteType::Photo, NoteType::Audio, NoteType::Video, NoteType::Map] {
            assert_eq!(NoteType::from_code(t.code()).unwrap(), t);
        }
        assert!(NoteType::from_code(0).is_err());

        assert_eq!(TypeFilter::All.code(), 0);
        assert_eq!(TypeFilter::from_code(0).unwrap(), TypeFilter::All);
        assert_eq!(
            TypeFilter::from_code(3).unwrap(),
            TypeFilter::Only(NoteType::Audio)
        );
        assert!(TypeFilter::from_code(9).is_err());
    }

    #[test]
    fn test_marked_first_for_every_key_and_order() {
        let notes = vec![
            note("b", 300, false),
            note("z", 100, true),
            note("a", 200, false),
            note("c", 50, true),
        ];

        for key in [SortKey::Date, SortKey::Title, SortKey::Type] {
            for order in [SortOrder::Ascending, SortOrder::Descending] {
                let mut sorted = notes.clone();
                sorted.sort_by(|a, b| compare_notes(a, b, key, order));
                assert!(sorted[0].marked() && sorted[1].marked(), "{:?} {:?}", key, order);
                assert!(!sorted[2].marked() && !sorted[3].marked(), "{:?} {:?}", key, order);
            }
        }
    }

    #[test]
    fn test_key_order_within_groups() {
        let mut notes = vec![note("b", 300, false), note("a", 200, false), note("c", 100, false)];

        notes.sort_by(|a, b| compare_notes(a, b, SortKey::Date, SortOrder::Descending));
        let dates: Vec<i64> = notes.iter().map(Note::mod_time).collect();
        assert_eq!(dates, vec![300, 200, 100]);

        notes.sort_by(|a, b| compare_notes(a, b, SortKey::Title, SortOrder::Ascending));
        let titles: Vec<&str> = notes.iter().map(Note::title).collect();
        assert_eq!(titles, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_matcher_is_case_insensitive() {
        let query = NoteQuery::default().with_filter(FilterMode::ByTitle, "SHOP");
        let matches = query.matcher();
        assert!(matches(&Note::new_text("Shopping list", "")));
        assert!(!matches(&Note::new_text("Todo", "shop")));

        let by_text = NoteQuery::default().with_filter(FilterMode::ByText, "milk");
        assert!(by_text.matcher()(&Note::new_text("Todo", "Buy MILK")));
    }

    #[test]
    fn test_matcher_folds_ascii_only() {
        let query = NoteQuery::default().with_filter(FilterMode::ByTitle, "ä");
        assert!(!query.matcher()(&Note::new_text("ÄRGER", "")));
        assert!(query.matcher()(&Note::new_text("Ärger mit ä", "")));

        let ascii = NoteQuery::default().with_filter(FilterMode::ByTitle, "rger");
        assert!(ascii.matcher()(&Note::new_text("ÄRGER", "")));
    }

    #[test]
    fn test_deserialize_checks_invariants() {
        let photo: Note = serde_json::from_str(
            r#"{"entry_id": 4, "note_type": "photo", "title": "Cat", "resource_path": "/cat.jpg"}"#,
        )
        .unwrap();
        assert_eq!(photo.entry_id(), 4);
        assert_eq!(photo.resource_path(), "/cat.jpg");
        assert!(!photo.is_serialized());

        let fresh: Note = serde_json::from_str(r#"{"note_type": "text", "text": "hi"}"#).unwrap();
        assert!(!fresh.is_saved());

        assert!(serde_json::from_str::<Note>(
            r#"{"entry_id": 0, "note_type": "text", "resource_path": "/bad"}"#
        )
        .is_err());
        assert!(serde_json::from_str::<Note>(r#"{"entry_id": -7, "note_type": "text"}"#).is_err());
    }

    #[test]
    fn test_matcher_type_filter() {
        let query = NoteQuery::default().with_type(TypeFilter::Only(NoteType::Photo));
        let photo = Note::resource(NoteType::Photo, "p", "/p.jpg").unwrap();
        assert!(query.matcher()(&photo));
        assert!(!query.matcher()(&Note::new_text("t", "")));
    }

    #[test]
    fn test_like_pattern_escapes_wildcards() {
        let query = NoteQuery::default().with_filter(FilterMode::ByTitle, "50%_off");
        assert_eq!(query.like_pattern().as_deref(), Some("%50\\%\\_off%"));
        assert_eq!(NoteQuery::default().like_pattern(), None);
    }
}
