use crate::picsort_core::manifest::MediaItem;
use crate::picsort_core::media::{Disposition, MediaKind};
use clap::ValueEnum;
use std::collections::HashMap;

/// Which items a session view shows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum FilterMode {
    #[default]
    All,
    Image,
    Video,
}

impl FilterMode {
    pub fn matches(&self, kind: MediaKind) -> bool {
        match self {
            FilterMode::All => true,
            FilterMode::Image => kind == MediaKind::Image,
            FilterMode::Video => kind == MediaKind::Video,
        }
    }
}

/// Everything a user can do to a session, whatever the input source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    SetDisposition(Disposition),
    Next,
    Prev,
    Undo,
    ChangeFilter(FilterMode),
}

/// The disposition an item had before one change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UndoEntry {
    /// Index into the master list.
    pub index: usize,
    pub previous: Disposition,
}

/// What a command did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Transition {
    pub disposition_changed: bool,
    pub cursor_moved: bool,
}

/// Filtered projection of the master list with its own cursor.
#[derive(Debug, Default)]
pub struct SessionView {
    filter: FilterMode,
    visible: Vec<usize>,
    visible_index: HashMap<usize, usize>,
    cursor: Option<usize>,
}

impl SessionView {
    fn rebuild(&mut self, items: &[MediaItem], filter: FilterMode, preferred: Option<usize>) {
        self.filter = filter;
        self.visible.clear();
        self.visible_index.clear();

        for (idx, item) in items.iter().enumerate() {
            if filter.matches(item.kind) {
                self.visible_index.insert(idx, self.visible.len());
                self.visible.push(idx);
            }
        }

        self.cursor = match preferred.and_then(|idx| self.visible_index.get(&idx)) {
            Some(&pos) => Some(pos),
            None if self.visible.is_empty() => None,
            None => Some(0),
        };
    }

    pub fn filter(&self) -> FilterMode {
        self.filter
    }

    pub fn len(&self) -> usize {
        self.visible.len()
    }

    pub fn is_empty(&self) -> bool {
        self.visible.is_empty()
    }

    /// Position within the view, absent when the view is empty.
    pub fn cursor(&self) -> Option<usize> {
        self.cursor
    }

    /// Master-list index of the item under the cursor.
    pub fn current_index(&self) -> Option<usize> {
        self.cursor.and_then(|pos| self.visible.get(pos).copied())
    }

    /// Master-list indexes in view order.
    pub fn indexes(&self) -> &[usize] {
        &self.visible
    }

    pub fn contains(&self, index: usize) -> bool {
        self.visible_index.contains_key(&index)
    }

    fn select_next(&mut self) -> bool {
        match self.cursor {
            Some(pos) if pos + 1 < self.visible.len() => {
                self.cursor = Some(pos + 1);
                true
            }
            _ => false,
        }
    }

    fn select_prev(&mut self) -> bool {
        match self.cursor {
            Some(pos) if pos > 0 => {
                self.cursor = Some(pos - 1);
                true
            }
            _ => false,
        }
    }

    fn jump_to(&mut self, index: usize) -> bool {
        match self.visible_index.get(&index) {
            Some(&pos) if self.cursor != Some(pos) => {
                self.cursor = Some(pos);
                true
            }
            _ => false,
        }
    }
}

/// Triage state: master list, active view, undo history.
///
/// All mutation goes through [`TriageSession::apply`].
#[derive(Debug)]
pub struct TriageSession {
    items: Vec<MediaItem>,
    view: SessionView,
    undo: Vec<UndoEntry>,
}

impl TriageSession {
    /// Start a session over manifest items, every item undecided.
    pub fn new(mut items: Vec<MediaItem>) -> Self {
        for item in &mut items {
            item.disposition = Disposition::Undecided;
        }
        let mut view = SessionView::default();
        view.rebuild(&items, FilterMode::All, None);

        TriageSession {
            items,
            view,
            undo: Vec::new(),
        }
    }

    pub fn apply(&mut self, command: Command) -> Transition {
        log::debug!("Session command {:?}", command);
        match command {
            Command::SetDisposition(disposition) => self.set_disposition(disposition),
            Command::Next => Transition {
                cursor_moved: self.view.select_next(),
                ..Default::default()
            },
            Command::Prev => Transition {
                cursor_moved: self.view.select_prev(),
                ..Default::default()
            },
            Command::Undo => self.undo(),
            Command::ChangeFilter(filter) => self.change_filter(filter),
        }
    }

    fn set_disposition(&mut self, disposition: Disposition) -> Transition {
        let Some(index) = self.view.current_index() else {
            return Transition::default();
        };

        let item = &mut self.items[index];
        let changed = item.disposition != disposition;
        if changed {
            self.undo.push(UndoEntry {
                index,
                previous: item.disposition,
            });
            item.disposition = disposition;
        }

        Transition {
            disposition_changed: changed,
            cursor_moved: self.view.select_next(),
        }
    }

    fn undo(&mut self) -> Transition {
        let Some(entry) = self.undo.pop() else {
            return Transition::default();
        };

        self.items[entry.index].disposition = entry.previous;
        // An item hidden by the active filter is restored without moving.
        Transition {
            disposition_changed: true,
            cursor_moved: self.view.jump_to(entry.index),
        }
    }

    fn change_filter(&mut self, filter: FilterMode) -> Transition {
        let before = self.view.current_index();
        self.view.rebuild(&self.items, filter, before);
        Transition {
            disposition_changed: false,
            cursor_moved: self.view.current_index() != before,
        }
    }

    /// The unfiltered master list, in manifest order.
    pub fn items(&self) -> &[MediaItem] {
        &self.items
    }

    pub fn view(&self) -> &SessionView {
        &self.view
    }

    pub fn current(&self) -> Option<&MediaItem> {
        self.view.current_index().and_then(|idx| self.items.get(idx))
    }

    pub fn undo_history(&self) -> &[UndoEntry] {
        &self.undo
    }

    pub fn count(&self, disposition: Disposition) -> usize {
        self.items
            .iter()
            .filter(|i| i.disposition == disposition)
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::picsort_core::manifest::make_src;
    use std::path::{Path, PathBuf};

    fn items(entries: &[(&str, MediaKind)]) -> Vec<MediaItem> {
        entries.iter()
            .map(|(name, kind)| MediaItem {
                filename: name.to_string(),
                source_path: PathBuf::from(name),
                src: make_src("/images", Path::new(name)),
                kind: *kind,
                capture_date: None,
                original_date: None,
                gps: None,
                disposition: Disposition::Undecided,
            })
            .collect()
    }

    fn mixed() -> TriageSession {
        TriageSession::new(items(&[
            ("a.jpg", MediaKind::Image),
            ("b.mov", MediaKind::Video),
            ("c.jpg", MediaKind::Image),
            ("d.mp4", MediaKind::Video),
            ("e.jpg", MediaKind::Image),
        ]))
    }

    fn current_name(session: &TriageSession) -> Option<&str> {
        session.current().map(|i| i.filename.as_str())
    }

    #[test]
    fn test_starts_on_first_item() {
        let session = mixed();
        assert_eq!(session.view().cursor(), Some(0));
        assert_eq!(current_name(&session), Some("a.jpg"));
        assert_eq!(session.count(Disposition::Undecided), 5);
    }

    #[test]
    fn test_navigation_is_clamped() {
        let mut session = mixed();
        assert!(!session.apply(Command::Prev).cursor_moved);
        assert_eq!(session.view().cursor(), Some(0));

        for _ in 0..10 {
            session.apply(Command::Next);
        }
        assert_eq!(current_name(&session), Some("e.jpg"));
        assert!(!session.apply(Command::Next).cursor_moved);
    }

    #[test]
    fn test_set_disposition_advances_and_records() {
        let mut session = mixed();
        let t = session.apply(Command::SetDisposition(Disposition::Favorite));
        assert!(t.disposition_changed && t.cursor_moved);
        assert_eq!(session.items()[0].disposition, Disposition::Favorite);
        assert_eq!(current_name(&session), Some("b.mov"));
        assert_eq!(
            session.undo_history(),
            &[UndoEntry {
                index: 0,
                previous: Disposition::Undecided
            }]
        );
    }

    #[test]
    fn test_repeat_disposition_records_once() {
        let mut session = mixed();
        session.apply(Command::SetDisposition(Disposition::Like));
        session.apply(Command::Prev);
        let t = session.apply(Command::SetDisposition(Disposition::Like));
        assert!(!t.disposition_changed);
        assert_eq!(session.undo_history().len(), 1);
    }

    #[test]
    fn test_last_item_stays_put() {
        let mut session = TriageSession::new(items(&[("a.jpg", MediaKind::Image)]));
        let t = session.apply(Command::SetDisposition(Disposition::Delete));
        assert!(t.disposition_changed);
        assert!(!t.cursor_moved);
        assert_eq!(session.view().cursor(), Some(0));
    }

    #[test]
    fn test_undo_restores_everything() {
        let mut session = mixed();
        let actions = [
            Disposition::Favorite,
            Disposition::Delete,
            Disposition::Later,
            Disposition::Like,
        ];
        for action in actions {
            session.apply(Command::SetDisposition(action));
        }
        // Revisit and overwrite.
        session.apply(Command::Prev);
        session.apply(Command::Prev);
        session.apply(Command::SetDisposition(Disposition::Favorite));

        let changes = session.undo_history().len();
        assert_eq!(changes, 5);
        for _ in 0..changes {
            assert!(session.apply(Command::Undo).disposition_changed);
        }
        assert_eq!(session.count(Disposition::Undecided), 5);
        assert!(session.undo_history().is_empty());
    }

    #[test]
    fn test_undo_steps_back_through_revisits() {
        let mut session = mixed();
        session.apply(Command::SetDisposition(Disposition::Favorite));
        session.apply(Command::Prev);
        session.apply(Command::SetDisposition(Disposition::Delete));
        session.apply(Command::Next);

        session.apply(Command::Undo);
        assert_eq!(session.items()[0].disposition, Disposition::Favorite);
        assert_eq!(current_name(&session), Some("a.jpg"));

        session.apply(Command::Undo);
        assert_eq!(session.items()[0].disposition, Disposition::Undecided);
    }

    #[test]
    fn test_undo_on_empty_stack_is_noop() {
        let mut session = mixed();
        session.apply(Command::Next);
        assert_eq!(session.apply(Command::Undo), Transition::default());
        assert_eq!(current_name(&session), Some("b.mov"));
    }

    #[test]
    fn test_filter_round_trip_keeps_item() {
        let mut session = mixed();
        session.apply(Command::Next);
        session.apply(Command::Next);
        assert_eq!(current_name(&session), Some("c.jpg"));

        session.apply(Command::ChangeFilter(FilterMode::Image));
        assert_eq!(current_name(&session), Some("c.jpg"));
        assert_eq!(session.view().cursor(), Some(1));
        assert_eq!(session.view().len(), 3);

        session.apply(Command::ChangeFilter(FilterMode::All));
        assert_eq!(current_name(&session), Some("c.jpg"));
        assert_eq!(session.view().cursor(), Some(2));
    }

    #[test]
    fn test_filter_without_current_item_resets() {
        let mut session = mixed();
        session.apply(Command::ChangeFilter(FilterMode::Video));
        assert_eq!(current_name(&session), Some("b.mov"));
        assert_eq!(session.view().indexes(), &[1, 3]);

        session.apply(Command::Next);
        session.apply(Command::Next);
        assert_eq!(current_name(&session), Some("d.mp4"));
    }

    #[test]
    fn test_empty_view_has_no_cursor() {
        let mut session = TriageSession::new(items(&[("a.jpg", MediaKind::Image)]));
        session.apply(Command::ChangeFilter(FilterMode::Video));
        assert!(session.view().is_empty());
        assert_eq!(session.view().cursor(), None);
        assert!(session.current().is_none());

        let t = session.apply(Command::SetDisposition(Disposition::Like));
        assert_eq!(t, Transition::default());
        assert!(session.undo_history().is_empty());
        assert_eq!(session.apply(Command::Next), Transition::default());

        session.apply(Command::ChangeFilter(FilterMode::All));
        assert_eq!(current_name(&session), Some("a.jpg"));
    }

    #[test]
    fn test_undo_of_hidden_item_keeps_cursor() {
        let mut session = mixed();
        session.apply(Command::SetDisposition(Disposition::Like)); // a.jpg
        session.apply(Command::ChangeFilter(FilterMode::Video));
        assert_eq!(current_name(&session), Some("b.mov"));

        let t = session.apply(Command::Undo);
        assert!(t.disposition_changed);
        assert!(!t.cursor_moved);
        assert_eq!(session.items()[0].disposition, Disposition::Undecided);
        assert_eq!(current_name(&session), Some("b.mov"));
    }

    #[test]
    fn test_empty_session() {
        let mut session = TriageSession::new(Vec::new());
        assert_eq!(session.view().cursor(), None);
        assert_eq!(session.apply(Command::Undo), Transition::default());
        assert_eq!(session.apply(Command::Prev), Transition::default());
    }
}
