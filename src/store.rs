//! The note state container.
//!
//! Owns the in-memory collection and the open note for one session, and decides
//! per operation whether to go to the remote store or the local slot. Every
//! operation is fail-soft: errors are logged and kept as a display string in
//! `error`, and the busy flags are always cleared again.
//!
//! The state mutex is only held between suspension points. An operation reads
//! what it needs, releases the lock, awaits the network, then re-locks to apply
//! the result, so overlapping operations interleave and the last one to land
//! wins.

use crate::ai_client::AiService;
use crate::config::MirrorPolicy;
use crate::error::NotesError;
use crate::local::LocalStore;
use crate::models::{
    is_local_id, NewNote, Note, NotePatch, NoteUpdate, OtherNote, Position, RelatedNote,
    Suggestion,
};
use crate::remote::RemoteNotes;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::{Mutex, MutexGuard, PoisonError};

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct StoreState {
    pub current: Option<Note>,
    pub notes: Vec<Note>,
    pub is_loading: bool,
    pub is_saving: bool,
    pub is_ai_loading: bool,
    pub error: Option<String>,
    pub suggestions: Vec<Suggestion>,
    pub related: Vec<RelatedNote>,
    pub summary: Option<String>,
    pub logged_in: bool,
}

pub struct NoteStore<R, A> {
    remote: R,
    ai: A,
    local: LocalStore,
    mirror: MirrorPolicy,
    state: Mutex<StoreState>,
}

impl<R: RemoteNotes, A: AiService> NoteStore<R, A> {
    pub fn new(remote: R, ai: A, local: LocalStore, mirror: MirrorPolicy) -> Self {
        Self {
            remote,
            ai,
            local,
            mirror,
            state: Mutex::new(StoreState::default()),
        }
    }

    pub fn remote(&self) -> &R {
        &self.remote
    }

    fn state(&self) -> MutexGuard<'_, StoreState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn snapshot(&self) -> StoreState {
        self.state().clone()
    }

    pub fn is_logged_in(&self) -> bool {
        self.state().logged_in
    }

    pub fn set_logged_in(&self, logged_in: bool) {
        self.state().logged_in = logged_in;
    }

    pub fn set_current(&self, note: Option<Note>) {
        self.state().current = note;
    }

    /// Makes the note with `id` the open note. Returns false if it is not loaded.
    pub fn open(&self, id: &str) -> bool {
        let mut state = self.state();
        match state.notes.iter().find(|n| n.id == id).cloned() {
            Some(note) => {
                state.current = Some(note);
                true
            }
            None => false,
        }
    }

    pub fn clear_error(&self) {
        self.state().error = None;
    }

    pub fn clear_suggestions(&self) {
        self.state().suggestions.clear();
    }

    pub fn clear_related(&self) {
        self.state().related.clear();
    }

    pub fn clear_summary(&self) {
        self.state().summary = None;
    }

    /// Drops all session state. Used when the session ends.
    pub fn reset(&self) {
        *self.state() = StoreState::default();
    }

    fn fail(&self, action: &str, err: NotesError, settle: impl FnOnce(&mut StoreState)) {
        log::error!("Failed to {}: {}", action, err);
        let mut state = self.state();
        settle(&mut *state);
        state.error = Some(err.to_string());
    }

    /// Writes the whole collection to the local slot when the mirror policy
    /// allows it. Otherwise only the touched local-only note is synced into
    /// the slot, so account rows never land there.
    fn persist_local(&self, state: &StoreState, touched: Option<&str>) {
        if self.mirror.mirrors(state.logged_in) {
            self.local.write_all(&state.notes);
            return;
        }
        let id = match touched.filter(|id| is_local_id(id)) {
            Some(id) => id,
            None => return,
        };

        let mut slot: Vec<Note> = self
            .local
            .read_all()
            .into_iter()
            .filter(Note::is_local)
            .collect();
        let held = state.notes.iter().chain(state.current.iter()).find(|n| n.id == id);
        match held {
            Some(note) => match slot.iter_mut().find(|n| n.id == id) {
                Some(entry) => *entry = note.clone(),
                None => slot.insert(0, note.clone()),
            },
            None => slot.retain(|n| n.id != id),
        }
        self.local.write_all(&slot);
    }

    /// Merges `patch` into the note with `id`, both in the open slot and in the list.
    fn merge_into(&self, id: &str, patch: &NotePatch) {
        let mut state = self.state();
        if let Some(current) = state.current.as_mut().filter(|c| c.id == id) {
            current.apply(patch);
        }
        for note in state.notes.iter_mut().filter(|n| n.id == id) {
            note.apply(patch);
        }
        self.persist_local(&state, Some(id));
    }

    fn begin(&self, flag: fn(&mut StoreState) -> &mut bool) {
        let mut state = self.state();
        *flag(&mut *state) = true;
        state.error = None;
    }

    // ========================================================================
    // Collection Operations
    // ========================================================================

    pub async fn load(&self) {
        if !self.is_logged_in() {
            let notes = self.local.read_all();
            self.state().notes = notes;
            return;
        }

        self.begin(|s| &mut s.is_loading);
        match self.remote.list().await {
            Ok(notes) => {
                let mut state = self.state();
                state.notes = notes;
                state.is_loading = false;
            }
            Err(e) => self.fail("load notes", e, |s| s.is_loading = false),
        }
    }

    pub async fn create(&self) {
        if !self.is_logged_in() {
            let mut state = self.state();
            let mut note = Note::new_local(Utc::now());
            // Two creates within one millisecond must not share an id.
            let mut millis = note.created_at.timestamp_millis();
            while state.notes.iter().any(|n| n.id == note.id) {
                millis += 1;
                note.id = format!("local_{}", millis);
            }
            let id = note.id.clone();
            state.notes.insert(0, note.clone());
            state.current = Some(note);
            self.persist_local(&state, Some(&id));
            return;
        }

        self.begin(|s| &mut s.is_saving);
        match self.remote.insert(NewNote::default()).await {
            Ok(note) => {
                let mut state = self.state();
                state.notes.insert(0, note.clone());
                state.current = Some(note);
                state.is_saving = false;
            }
            Err(e) => self.fail("create note", e, |s| s.is_saving = false),
        }
    }

    /// Shallow-merges `patch` into the open note and mirrors the collection locally.
    pub fn set_field(&self, patch: &NotePatch) {
        let id = match self.state().current.as_ref() {
            Some(note) => note.id.clone(),
            None => return,
        };
        self.merge_into(&id, patch);
    }

    /// Pushes the open note to the remote store. Local-only notes are already
    /// persisted by `set_field`, so they never cause a network call.
    pub async fn save(&self) {
        let (current, logged_in) = {
            let state = self.state();
            (state.current.clone(), state.logged_in)
        };
        let note = match current {
            Some(note) => note,
            None => return,
        };
        if !logged_in || note.is_local() {
            self.state().is_saving = false;
            return;
        }

        self.begin(|s| &mut s.is_saving);
        match self
            .remote
            .update(&note.id, NoteUpdate::from_note(&note, Utc::now()))
            .await
        {
            Ok(updated) => {
                let mut state = self.state();
                for entry in state.notes.iter_mut().filter(|n| n.id == updated.id) {
                    *entry = updated.clone();
                }
                if state.current.as_ref().map(|c| c.id == updated.id).unwrap_or(false) {
                    state.current = Some(updated);
                }
                state.is_saving = false;
            }
            Err(e) => self.fail("save note", e, |s| s.is_saving = false),
        }
    }

    pub async fn delete(&self, id: &str) {
        if self.is_logged_in() && !is_local_id(id) {
            self.begin(|s| &mut s.is_loading);
            match self.remote.delete(id).await {
                Ok(()) => {
                    let mut state = self.state();
                    remove_note(&mut state, id);
                    state.is_loading = false;
                }
                Err(e) => self.fail("delete note", e, |s| s.is_loading = false),
            }
            return;
        }

        let mut state = self.state();
        remove_note(&mut state, id);
        self.persist_local(&state, Some(id));
    }

    /// A blank query is the same as `load`.
    pub async fn search(&self, query: &str) {
        if !self.is_logged_in() {
            let notes = self.local.read_all();
            let notes = if query.trim().is_empty() {
                notes
            } else {
                notes.into_iter().filter(|n| n.matches_query(query)).collect()
            };
            self.state().notes = notes;
            return;
        }

        if query.trim().is_empty() {
            return self.load().await;
        }

        self.begin(|s| &mut s.is_loading);
        match self.remote.search(query).await {
            Ok(mut notes) => {
                notes.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
                let mut state = self.state();
                state.notes = notes;
                state.is_loading = false;
            }
            Err(e) => self.fail("search notes", e, |s| s.is_loading = false),
        }
    }

    /// Narrows the list to notes carrying exactly `tag`. A blank tag reloads.
    pub async fn filter_by_tag(&self, tag: &str) {
        if tag.trim().is_empty() {
            return self.load().await;
        }

        if !self.is_logged_in() {
            let notes: Vec<Note> = self
                .local
                .read_all()
                .into_iter()
                .filter(|n| n.tags.iter().any(|t| t == tag))
                .collect();
            self.state().notes = notes;
            return;
        }

        self.begin(|s| &mut s.is_loading);
        match self.remote.by_tag(tag).await {
            Ok(notes) => {
                let mut state = self.state();
                state.notes = notes;
                state.is_loading = false;
            }
            Err(e) => self.fail("filter notes by tag", e, |s| s.is_loading = false),
        }
    }

    // ========================================================================
    // AI Actions
    // ========================================================================

    /// The open note, if it passes `guard`.
    fn current_if(&self, guard: impl FnOnce(&Note) -> bool) -> Option<Note> {
        self.state().current.clone().filter(|n| guard(n))
    }

    pub async fn summarize(&self) {
        let note = match self.current_if(|n| !n.content.trim().is_empty()) {
            Some(note) => note,
            None => return,
        };

        self.begin(|s| &mut s.is_ai_loading);
        match self.ai.summarize(&note.content).await {
            Ok(summary) => {
                self.merge_into(
                    &note.id,
                    &NotePatch {
                        summary: Some(summary.clone()),
                        ..Default::default()
                    },
                );
                let mut state = self.state();
                state.summary = Some(summary);
                state.is_ai_loading = false;
            }
            Err(e) => return self.fail("generate summary", e, |s| s.is_ai_loading = false),
        }
        self.save().await;
    }

    pub async fn suggest_tags(&self) {
        let note = match self.current_if(|n| {
            !n.content.trim().is_empty() || !n.title.as_deref().unwrap_or("").trim().is_empty()
        }) {
            Some(note) => note,
            None => return,
        };

        self.begin(|s| &mut s.is_ai_loading);
        let title = note.title.clone().unwrap_or_default();
        match self.ai.suggest_tags(&note.content, &title).await {
            Ok(suggested) => {
                let tags = merge_tags(&note.tags, &suggested);
                self.merge_into(
                    &note.id,
                    &NotePatch {
                        tags: Some(tags),
                        ..Default::default()
                    },
                );
                self.state().is_ai_loading = false;
            }
            Err(e) => return self.fail("suggest tags", e, |s| s.is_ai_loading = false),
        }
        self.save().await;
    }

    pub async fn improve(&self) {
        let note = match self.current_if(|n| !n.content.trim().is_empty()) {
            Some(note) => note,
            None => return,
        };

        self.begin(|s| &mut s.is_ai_loading);
        match self.ai.improve(&note.content).await {
            Ok(improved) => {
                self.merge_into(
                    &note.id,
                    &NotePatch {
                        content: Some(improved),
                        ..Default::default()
                    },
                );
                self.state().is_ai_loading = false;
            }
            Err(e) => return self.fail("improve content", e, |s| s.is_ai_loading = false),
        }
        self.save().await;
    }

    pub async fn suggest(&self) {
        let note = match self.current_if(|n| !n.content.trim().is_empty()) {
            Some(note) => note,
            None => return,
        };

        self.begin(|s| &mut s.is_ai_loading);
        match self.ai.suggestions(&note.content).await {
            Ok(suggestions) => {
                let mut state = self.state();
                state.suggestions = suggestions;
                state.is_ai_loading = false;
            }
            Err(e) => self.fail("generate suggestions", e, |s| s.is_ai_loading = false),
        }
    }

    pub async fn relate(&self) {
        let (note, others) = {
            let state = self.state();
            let note = match state.current.as_ref() {
                Some(note) if !note.content.trim().is_empty() && state.notes.len() > 1 => {
                    note.clone()
                }
                _ => return,
            };
            let others: Vec<OtherNote> = state
                .notes
                .iter()
                .filter(|n| n.id != note.id)
                .map(OtherNote::from)
                .collect();
            (note, others)
        };

        self.begin(|s| &mut s.is_ai_loading);
        match self.ai.related(&note.content, &others).await {
            Ok(related) => {
                let mut state = self.state();
                state.related = related;
                state.is_ai_loading = false;
            }
            Err(e) => self.fail("find related notes", e, |s| s.is_ai_loading = false),
        }
    }

    /// Splices a suggestion into the open note, drops it from the buffer, and saves.
    pub async fn apply_suggestion(&self, suggestion: &Suggestion) {
        let note = match self.state().current.clone() {
            Some(note) => note,
            None => return,
        };

        self.merge_into(
            &note.id,
            &NotePatch {
                content: Some(splice_suggestion(&note.content, suggestion)),
                ..Default::default()
            },
        );
        self.state().suggestions.retain(|s| s != suggestion);
        self.save().await;
    }
}

fn remove_note(state: &mut StoreState, id: &str) {
    state.notes.retain(|n| n.id != id);
    if state.current.as_ref().map(|c| c.id == id).unwrap_or(false) {
        state.current = None;
    }
}

/// Existing tags followed by new suggestions, with duplicates dropped.
pub fn merge_tags(existing: &[String], suggested: &[String]) -> Vec<String> {
    let mut merged: Vec<String> = Vec::with_capacity(existing.len() + suggested.len());
    for tag in existing.iter().chain(suggested) {
        if !merged.contains(tag) {
            merged.push(tag.clone());
        }
    }
    merged
}

pub fn splice_suggestion(content: &str, suggestion: &Suggestion) -> String {
    match suggestion.position() {
        Position::Beginning => format!("{}\n\n{}", suggestion.content, content),
        Position::Middle => {
            let mut lines: Vec<&str> = content.split('\n').collect();
            let middle = lines.len() / 2;
            lines.insert(middle, &suggestion.content);
            lines.join("\n")
        }
        Position::End => format!("{}\n\n{}", content, suggestion.content),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Result;
    use crate::local::temp_store;
    use chrono::{Duration, TimeZone};
    use std::sync::atomic::{AtomicUsize, Ordering};

    // ========================================================================
    // Fakes
    // ========================================================================

    #[derive(Default)]
    struct FakeRemote {
        rows: Mutex<Vec<Note>>,
        calls: AtomicUsize,
        fail_with: Option<u16>,
    }

    impl FakeRemote {
        fn with_rows(rows: Vec<Note>) -> Self {
            Self {
                rows: Mutex::new(rows),
                ..Default::default()
            }
        }

        fn failing(status: u16) -> Self {
            Self {
                fail_with: Some(status),
                ..Default::default()
            }
        }

        fn call(&self) -> Result<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match self.fail_with {
                Some(status) => Err(NotesError::Remote {
                    status,
                    message: "store unavailable".to_string(),
                }),
                None => Ok(()),
            }
        }

        fn sorted(&self) -> Vec<Note> {
            let mut rows = self.rows.lock().unwrap().clone();
            rows.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
            rows
        }
    }

    impl RemoteNotes for FakeRemote {
        async fn list(&self) -> Result<Vec<Note>> {
            self.call()?;
            Ok(self.sorted())
        }

        async fn get(&self, id: &str) -> Result<Option<Note>> {
            self.call()?;
            Ok(self.rows.lock().unwrap().iter().find(|n| n.id == id).cloned())
        }

        async fn insert(&self, new: NewNote) -> Result<Note> {
            self.call()?;
            let mut rows = self.rows.lock().unwrap();
            let mut note = remote_note(&format!("srv-{}", rows.len() + 1), 100);
            note.title = Some(new.title);
            note.content = new.content;
            note.tags = new.tags;
            rows.push(note.clone());
            Ok(note)
        }

        async fn update(&self, id: &str, update: NoteUpdate) -> Result<Note> {
            self.call()?;
            let mut rows = self.rows.lock().unwrap();
            let row = rows.iter_mut().find(|n| n.id == id).ok_or(NotesError::Remote {
                status: 406,
                message: "no row".to_string(),
            })?;
            row.title = update.title;
            row.content = update.content;
            row.tags = update.tags;
            row.summary = update.summary;
            row.updated_at = update.updated_at;
            Ok(row.clone())
        }

        async fn delete(&self, id: &str) -> Result<()> {
            self.call()?;
            self.rows.lock().unwrap().retain(|n| n.id != id);
            Ok(())
        }

        async fn search(&self, query: &str) -> Result<Vec<Note>> {
            self.call()?;
            let q = query.to_lowercase();
            // Deliberately unordered, the container sorts.
            let mut rows = self.sorted();
            rows.reverse();
            Ok(rows
                .into_iter()
                .filter(|n| {
                    n.content.to_lowercase().contains(&q)
                        || n.title.as_deref().unwrap_or("").to_lowercase().contains(&q)
                })
                .collect())
        }

        async fn by_tag(&self, tag: &str) -> Result<Vec<Note>> {
            self.call()?;
            Ok(self
                .sorted()
                .into_iter()
                .filter(|n| n.tags.iter().any(|t| t == tag))
                .collect())
        }
    }

    #[derive(Default)]
    struct FakeAi {
        tags: Vec<String>,
        suggestions: Vec<Suggestion>,
        related: Vec<RelatedNote>,
        fail: bool,
        calls: AtomicUsize,
        related_requests: Mutex<Vec<Vec<OtherNote>>>,
    }

    impl FakeAi {
        fn check(&self) -> Result<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                Err(NotesError::Upstream("500 Internal Server Error - boom".to_string()))
            } else {
                Ok(())
            }
        }
    }

    impl AiService for FakeAi {
        async fn summarize(&self, content: &str) -> Result<String> {
            self.check()?;
            Ok(format!("- {}", content.lines().next().unwrap_or("")))
        }

        async fn suggest_tags(&self, _content: &str, _title: &str) -> Result<Vec<String>> {
            self.check()?;
            Ok(self.tags.clone())
        }

        async fn improve(&self, content: &str) -> Result<String> {
            self.check()?;
            Ok(content.to_uppercase())
        }

        async fn suggestions(&self, _content: &str) -> Result<Vec<Suggestion>> {
            self.check()?;
            Ok(self.suggestions.clone())
        }

        async fn related(&self, _current: &str, others: &[OtherNote]) -> Result<Vec<RelatedNote>> {
            self.check()?;
            self.related_requests.lock().unwrap().push(others.to_vec());
            Ok(self.related.clone())
        }
    }

    // ========================================================================
    // Helpers
    // ========================================================================

    fn remote_note(id: &str, minutes: i64) -> Note {
        let base = Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap();
        Note {
            id: id.to_string(),
            user_id: "u-1".to_string(),
            title: Some(format!("Note {}", id)),
            content: format!("content of {}", id),
            tags: Vec::new(),
            summary: None,
            created_at: base,
            updated_at: base + Duration::minutes(minutes),
        }
    }

    fn suggestion(content: &str, position: &str) -> Suggestion {
        Suggestion {
            title: "Add".to_string(),
            content: content.to_string(),
            position: position.to_string(),
        }
    }

    type TestStore = NoteStore<FakeRemote, FakeAi>;

    fn store(remote: FakeRemote, ai: FakeAi) -> (tempfile::TempDir, LocalStore, TestStore) {
        let (dir, local) = temp_store();
        let store = NoteStore::new(remote, ai, local.clone(), MirrorPolicy::Always);
        (dir, local, store)
    }

    fn logged_in(remote: FakeRemote, ai: FakeAi) -> (tempfile::TempDir, LocalStore, TestStore) {
        let parts = store(remote, ai);
        parts.2.set_logged_in(true);
        parts
    }

    // ========================================================================
    // Collection operations
    // ========================================================================

    #[tokio::test]
    async fn test_create_logged_out_makes_local_note() {
        let (_dir, local, store) = store(FakeRemote::default(), FakeAi::default());
        store.create().await;
        store.create().await;

        let state = store.snapshot();
        assert_eq!(state.notes.len(), 2);
        let newest = &state.notes[0];
        let digits = newest.id.strip_prefix("local_").unwrap();
        assert!(digits.parse::<i64>().is_ok());
        assert_ne!(state.notes[0].id, state.notes[1].id);
        assert_eq!(state.current.as_ref(), Some(newest));
        assert_eq!(local.read_all(), state.notes);
        assert_eq!(store.remote().calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_create_logged_in_prepends_remote_row() {
        let (_dir, _local, store) =
            logged_in(FakeRemote::with_rows(vec![remote_note("a", 1)]), FakeAi::default());
        store.load().await;
        store.create().await;

        let state = store.snapshot();
        assert_eq!(state.notes[0].id, "srv-2");
        assert_eq!(state.notes[0].display_title(), "Untitled");
        assert_eq!(state.current.unwrap().id, "srv-2");
        assert!(!state.is_saving);
    }

    #[tokio::test]
    async fn test_set_field_merges_and_mirrors() {
        let (_dir, local, store) = store(FakeRemote::default(), FakeAi::default());
        store.create().await;
        store.set_field(&NotePatch {
            title: Some("Channels".to_string()),
            ..Default::default()
        });
        store.set_field(&NotePatch {
            content: Some("Learn Go channels".to_string()),
            ..Default::default()
        });

        let state = store.snapshot();
        let current = state.current.clone().unwrap();
        assert_eq!(current.display_title(), "Channels");
        assert_eq!(current.content, "Learn Go channels");
        assert_eq!(state.notes[0], current);
        assert_eq!(local.read_all(), state.notes);
    }

    #[tokio::test]
    async fn test_set_field_mirrors_while_logged_in() {
        let (_dir, local, store) =
            logged_in(FakeRemote::with_rows(vec![remote_note("a", 1)]), FakeAi::default());
        store.load().await;
        assert!(store.open("a"));
        store.set_field(&NotePatch {
            content: Some("edited".to_string()),
            ..Default::default()
        });
        assert_eq!(local.read_all()[0].content, "edited");
    }

    #[tokio::test]
    async fn test_logged_out_only_policy_keeps_remote_notes_out_of_slot() {
        let (_dir, local) = temp_store();
        let store = NoteStore::new(
            FakeRemote::with_rows(vec![remote_note("a", 1)]),
            FakeAi::default(),
            local.clone(),
            MirrorPolicy::LoggedOutOnly,
        );
        store.set_logged_in(true);
        store.load().await;
        store.open("a");
        store.set_field(&NotePatch {
            content: Some("private".to_string()),
            ..Default::default()
        });
        assert!(local.read_all().is_empty());
        assert_eq!(store.snapshot().notes[0].content, "private");
    }

    fn offline_note(id: &str, content: &str) -> Note {
        let mut note = remote_note(id, 0);
        note.user_id = crate::models::LOCAL_OWNER.to_string();
        note.content = content.to_string();
        note
    }

    fn logged_out_only(remote: FakeRemote) -> (tempfile::TempDir, LocalStore, TestStore) {
        let (dir, local) = temp_store();
        let store = NoteStore::new(
            remote,
            FakeAi::default(),
            local.clone(),
            MirrorPolicy::LoggedOutOnly,
        );
        store.set_logged_in(true);
        (dir, local, store)
    }

    #[tokio::test]
    async fn test_logged_out_only_policy_delete_keeps_offline_notes() {
        let (_dir, local, store) =
            logged_out_only(FakeRemote::with_rows(vec![remote_note("a", 1)]));
        local.write_all(&[offline_note("local_1", "one"), offline_note("local_2", "two")]);
        store.load().await;

        store.delete("local_1").await;

        let ids: Vec<String> = local.read_all().into_iter().map(|n| n.id).collect();
        assert_eq!(ids, vec!["local_2"]);
        assert_eq!(store.snapshot().notes[0].id, "a");
        assert_eq!(store.remote().calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_logged_out_only_policy_edit_of_offline_note_syncs_only_that_note() {
        let (_dir, local, store) =
            logged_out_only(FakeRemote::with_rows(vec![remote_note("a", 1)]));
        local.write_all(&[offline_note("local_1", "one"), offline_note("local_2", "two")]);
        store.load().await;
        store.set_current(Some(offline_note("local_2", "two")));

        store.set_field(&NotePatch {
            content: Some("two, revised".to_string()),
            ..Default::default()
        });

        let slot = local.read_all();
        assert_eq!(slot.len(), 2);
        assert!(slot.iter().all(|n| n.is_local()));
        assert_eq!(slot[1].content, "two, revised");
        assert_eq!(slot[0].content, "one");
    }

    #[tokio::test]
    async fn test_set_field_without_open_note_is_noop() {
        let (_dir, local, store) = store(FakeRemote::default(), FakeAi::default());
        store.set_field(&NotePatch {
            content: Some("lost".to_string()),
            ..Default::default()
        });
        assert_eq!(store.snapshot(), StoreState::default());
        assert!(local.read_all().is_empty());
    }

    #[tokio::test]
    async fn test_save_local_note_makes_no_network_call() {
        let (_dir, _local, store) = logged_in(FakeRemote::default(), FakeAi::default());
        store.set_current(Some(Note::new_local(Utc::now())));
        store.save().await;
        assert_eq!(store.remote().calls.load(Ordering::SeqCst), 0);
        assert!(!store.snapshot().is_saving);
    }

    #[tokio::test]
    async fn test_save_replaces_entry_with_server_row() {
        let (_dir, _local, store) =
            logged_in(FakeRemote::with_rows(vec![remote_note("a", 1)]), FakeAi::default());
        store.load().await;
        store.open("a");
        store.set_field(&NotePatch {
            tags: Some(vec!["go".to_string()]),
            ..Default::default()
        });
        let before = store.snapshot().notes[0].updated_at;
        store.save().await;

        let state = store.snapshot();
        assert_eq!(state.notes[0].tags, vec!["go".to_string()]);
        assert!(state.notes[0].updated_at > before);
        assert_eq!(state.current.unwrap().updated_at, state.notes[0].updated_at);
    }

    #[tokio::test]
    async fn test_remote_failure_sets_error_and_clears_flag() {
        let (_dir, _local, store) = logged_in(FakeRemote::failing(503), FakeAi::default());
        store.load().await;
        let state = store.snapshot();
        assert!(!state.is_loading);
        assert_eq!(
            state.error.as_deref(),
            Some("Remote store error (503): store unavailable")
        );
        store.clear_error();
        assert!(store.snapshot().error.is_none());
    }

    #[tokio::test]
    async fn test_delete_clears_open_note() {
        let (_dir, local, store) = store(FakeRemote::default(), FakeAi::default());
        store.create().await;
        let id = store.snapshot().current.unwrap().id;
        store.delete(&id).await;

        let state = store.snapshot();
        assert!(state.current.is_none());
        assert!(state.notes.is_empty());
        assert!(local.read_all().is_empty());
    }

    #[tokio::test]
    async fn test_delete_remote_note() {
        let (_dir, _local, store) = logged_in(
            FakeRemote::with_rows(vec![remote_note("a", 1), remote_note("b", 2)]),
            FakeAi::default(),
        );
        store.load().await;
        store.open("b");
        store.delete("a").await;

        let state = store.snapshot();
        assert_eq!(state.notes.len(), 1);
        assert_eq!(state.current.unwrap().id, "b");
        assert_eq!(store.remote().rows.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_empty_search_equals_load() {
        let rows = vec![remote_note("a", 1), remote_note("b", 3), remote_note("c", 2)];
        let (_dir, _local, store) = logged_in(FakeRemote::with_rows(rows), FakeAi::default());
        store.load().await;
        let loaded = store.snapshot().notes;
        store.search("content of a").await;
        assert_eq!(store.snapshot().notes.len(), 1);
        store.search("").await;
        assert_eq!(store.snapshot().notes, loaded);
        let ids: Vec<String> = loaded.into_iter().map(|n| n.id).collect();
        assert_eq!(ids, vec!["b", "c", "a"]);
    }

    #[tokio::test]
    async fn test_remote_search_is_sorted_newest_first() {
        let rows = vec![remote_note("a", 1), remote_note("b", 3), remote_note("c", 2)];
        let (_dir, _local, store) = logged_in(FakeRemote::with_rows(rows), FakeAi::default());
        store.search("content").await;
        let ids: Vec<String> = store.snapshot().notes.into_iter().map(|n| n.id).collect();
        assert_eq!(ids, vec!["b", "c", "a"]);
    }

    #[tokio::test]
    async fn test_local_search_covers_title_content_and_tags() {
        let (_dir, _local, store) = store(FakeRemote::default(), FakeAi::default());
        store.create().await;
        store.set_field(&NotePatch {
            content: Some("Ownership and borrowing".to_string()),
            ..Default::default()
        });
        store.create().await;
        store.set_field(&NotePatch {
            title: Some("Groceries".to_string()),
            tags: Some(vec!["Errands".to_string()]),
            ..Default::default()
        });

        store.search("BORROW").await;
        assert_eq!(store.snapshot().notes.len(), 1);
        store.search("errand").await;
        assert_eq!(store.snapshot().notes[0].display_title(), "Groceries");
        store.search("").await;
        assert_eq!(store.snapshot().notes.len(), 2);
    }

    #[tokio::test]
    async fn test_filter_by_tag() {
        let mut tagged = remote_note("a", 1);
        tagged.tags = vec!["rust".to_string()];
        let (_dir, _local, store) = logged_in(
            FakeRemote::with_rows(vec![tagged, remote_note("b", 2)]),
            FakeAi::default(),
        );
        store.filter_by_tag("rust").await;
        let notes = store.snapshot().notes;
        assert_eq!(notes.len(), 1);
        assert_eq!(notes[0].id, "a");
    }

    // ========================================================================
    // AI actions
    // ========================================================================

    #[tokio::test]
    async fn test_suggest_tags_unions_and_saves() {
        let mut note = remote_note("a", 1);
        note.tags = vec!["go".to_string()];
        let ai = FakeAi {
            tags: vec!["concurrency".to_string(), "go".to_string(), "channels".to_string()],
            ..Default::default()
        };
        let (_dir, _local, store) = logged_in(FakeRemote::with_rows(vec![note]), ai);
        store.load().await;
        store.open("a");
        store.suggest_tags().await;

        let state = store.snapshot();
        assert_eq!(state.current.unwrap().tags, vec!["go", "concurrency", "channels"]);
        assert!(!state.is_ai_loading);
        let saved = store.remote().rows.lock().unwrap()[0].tags.clone();
        assert_eq!(saved, vec!["go", "concurrency", "channels"]);
    }

    #[tokio::test]
    async fn test_summarize_writes_summary_into_note() {
        let (_dir, local, store) = store(FakeRemote::default(), FakeAi::default());
        store.create().await;
        store.set_field(&NotePatch {
            content: Some("First line\nsecond".to_string()),
            ..Default::default()
        });
        store.summarize().await;

        let state = store.snapshot();
        assert_eq!(state.summary.as_deref(), Some("- First line"));
        assert_eq!(state.current.unwrap().summary.as_deref(), Some("- First line"));
        assert_eq!(local.read_all()[0].summary.as_deref(), Some("- First line"));
        store.clear_summary();
        assert!(store.snapshot().summary.is_none());
    }

    #[tokio::test]
    async fn test_ai_guard_skips_empty_content() {
        let ai = FakeAi {
            fail: true,
            ..Default::default()
        };
        let (_dir, _local, store) = store(FakeRemote::default(), ai);
        store.create().await;
        store.summarize().await;
        store.improve().await;
        store.suggest().await;
        assert_eq!(store.ai.calls.load(Ordering::SeqCst), 0);
        assert!(store.snapshot().error.is_none());

        // Title "Untitled" is enough input for tags, so the failing fake is reached.
        store.suggest_tags().await;
        let state = store.snapshot();
        assert_eq!(store.ai.calls.load(Ordering::SeqCst), 1);
        assert!(!state.is_ai_loading);
        assert!(state.error.unwrap().contains("boom"));
    }

    #[tokio::test]
    async fn test_improve_failure_keeps_content() {
        let ai = FakeAi {
            fail: true,
            ..Default::default()
        };
        let (_dir, _local, store) = store(FakeRemote::default(), ai);
        store.create().await;
        store.set_field(&NotePatch {
            content: Some("draft".to_string()),
            ..Default::default()
        });
        store.improve().await;
        let state = store.snapshot();
        assert_eq!(state.current.unwrap().content, "draft");
        assert!(!state.is_ai_loading);
        assert!(state.error.is_some());
    }

    #[tokio::test]
    async fn test_relate_sends_other_notes_only() {
        let ai = FakeAi {
            related: vec![RelatedNote {
                id: "b".to_string(),
                score: 0.8,
            }],
            ..Default::default()
        };
        let (_dir, _local, store) = logged_in(
            FakeRemote::with_rows(vec![remote_note("a", 1), remote_note("b", 2)]),
            ai,
        );
        store.load().await;
        store.open("a");
        store.relate().await;

        let state = store.snapshot();
        assert_eq!(state.related.len(), 1);
        let sent = store.ai.related_requests.lock().unwrap()[0].clone();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].id, "b");
        store.clear_related();
        assert!(store.snapshot().related.is_empty());
    }

    #[tokio::test]
    async fn test_relate_needs_another_note() {
        let (_dir, _local, store) = store(FakeRemote::default(), FakeAi::default());
        store.create().await;
        store.set_field(&NotePatch {
            content: Some("alone".to_string()),
            ..Default::default()
        });
        store.relate().await;
        assert!(store.ai.related_requests.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_apply_suggestion_splices_and_drops_from_buffer() {
        let keep = suggestion("## Links", "end");
        let apply = suggestion("X", "middle");
        let ai = FakeAi {
            suggestions: vec![apply.clone(), keep.clone()],
            ..Default::default()
        };
        let (_dir, _local, store) = store(FakeRemote::default(), ai);
        store.create().await;
        store.set_field(&NotePatch {
            content: Some("a\nb\nc\nd".to_string()),
            ..Default::default()
        });
        store.suggest().await;
        store.apply_suggestion(&apply).await;

        let state = store.snapshot();
        assert_eq!(state.current.unwrap().content, "a\nb\nX\nc\nd");
        assert_eq!(state.suggestions, vec![keep]);
        store.clear_suggestions();
        assert!(store.snapshot().suggestions.is_empty());
    }

    #[tokio::test]
    async fn test_reset_clears_session() {
        let (_dir, _local, store) = logged_in(
            FakeRemote::with_rows(vec![remote_note("a", 1)]),
            FakeAi::default(),
        );
        store.load().await;
        store.open("a");
        store.reset();
        assert_eq!(store.snapshot(), StoreState::default());
    }

    // ========================================================================
    // Pure helpers
    // ========================================================================

    #[test]
    fn test_splice_positions() {
        assert_eq!(splice_suggestion("body", &suggestion("top", "beginning")), "top\n\nbody");
        assert_eq!(splice_suggestion("body", &suggestion("tail", "end")), "body\n\ntail");
        assert_eq!(splice_suggestion("body", &suggestion("tail", "elsewhere")), "body\n\ntail");
        assert_eq!(splice_suggestion("a\nb\nc\nd", &suggestion("X", "middle")), "a\nb\nX\nc\nd");
        assert_eq!(splice_suggestion("", &suggestion("X", "middle")), "X\n");
    }

    #[test]
    fn test_merge_tags_preserves_order() {
        let existing = vec!["go".to_string(), "go".to_string()];
        let suggested = vec!["rust".to_string(), "go".to_string()];
        assert_eq!(merge_tags(&existing, &suggested), vec!["go", "rust"]);
    }
}
