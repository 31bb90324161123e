//! Input sources. Keyboard lines and controller samples both become
//! [`Command`]s and go through the same queue into the session.

use crate::picsort_core::media::Disposition;
use crate::picsort_core::session::{Command, FilterMode, TriageSession, Transition};
use std::collections::{HashSet, VecDeque};

/// Map a single key to a command.
pub fn command_for_key(key: char) -> Option<Command> {
    let command = match key.to_ascii_lowercase() {
        '1' | 'f' => Command::SetDisposition(Disposition::Favorite),
        '2' | 'l' => Command::SetDisposition(Disposition::Like),
        '3' | 't' => Command::SetDisposition(Disposition::Later),
        '4' | 'd' => Command::SetDisposition(Disposition::Delete),
        '0' | 'c' => Command::SetDisposition(Disposition::Undecided),
        'n' | '.' => Command::Next,
        'p' | ',' => Command::Prev,
        'u' | 'z' => Command::Undo,
        'a' => Command::ChangeFilter(FilterMode::All),
        'i' => Command::ChangeFilter(FilterMode::Image),
        'v' => Command::ChangeFilter(FilterMode::Video),
        _ => return None,
    };
    Some(command)
}

/// Map a typed line (a key or a word) to a command.
pub fn command_for_input(line: &str) -> Option<Command> {
    let word = line.trim().to_ascii_lowercase();
    let mut chars = word.chars();
    if let (Some(key), None) = (chars.next(), chars.next()) {
        return command_for_key(key);
    }

    let command = match word.as_str() {
        "next" => Command::Next,
        "prev" | "back" => Command::Prev,
        "undo" => Command::Undo,
        "clear" | "undecided" => Command::SetDisposition(Disposition::Undecided),
        "all" => Command::ChangeFilter(FilterMode::All),
        "image" | "images" => Command::ChangeFilter(FilterMode::Image),
        "video" | "videos" => Command::ChangeFilter(FilterMode::Video),
        other => Command::SetDisposition(Disposition::from_status(other)?),
    };
    Some(command)
}

/// Controller buttons the triage view reacts to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Button {
    A,
    B,
    X,
    Y,
    DPadLeft,
    DPadRight,
    LeftShoulder,
    RightShoulder,
    Select,
}

impl Button {
    fn command(&self) -> Option<Command> {
        match self {
            Button::A => Some(Command::SetDisposition(Disposition::Like)),
            Button::B => Some(Command::SetDisposition(Disposition::Delete)),
            Button::X => Some(Command::SetDisposition(Disposition::Later)),
            Button::Y => Some(Command::SetDisposition(Disposition::Favorite)),
            Button::DPadLeft => Some(Command::Prev),
            Button::DPadRight => Some(Command::Next),
            Button::LeftShoulder => Some(Command::Undo),
            Button::RightShoulder | Button::Select => None,
        }
    }
}

/// Turns per-frame button samples into commands on new presses only.
#[derive(Debug, Default)]
pub struct ControllerPoller {
    held: HashSet<Button>,
    filter: FilterMode,
}

impl ControllerPoller {
    /// Feed one frame's pressed buttons; newly pressed ones are queued.
    pub fn sample(&mut self, pressed: &[Button], queue: &mut CommandQueue) {
        let now: HashSet<Button> = pressed.iter().copied().collect();
        for button in pressed {
            if self.held.contains(button) {
                continue;
            }
            if let Some(command) = self.command_for(*button) {
                queue.push(command);
            }
        }
        self.held = now;
    }

    fn command_for(&mut self, button: Button) -> Option<Command> {
        if button == Button::RightShoulder {
            self.filter = match self.filter {
                FilterMode::All => FilterMode::Image,
                FilterMode::Image => FilterMode::Video,
                FilterMode::Video => FilterMode::All,
            };
            return Some(Command::ChangeFilter(self.filter));
        }
        button.command()
    }
}

/// Commands waiting to be applied, in arrival order.
#[derive(Debug, Default)]
pub struct CommandQueue {
    pending: VecDeque<Command>,
}

impl CommandQueue {
    pub fn push(&mut self, command: Command) {
        self.pending.push_back(command);
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Apply every queued command, one at a time.
    pub fn drain_into(&mut self, session: &mut TriageSession) -> Vec<Transition> {
        self.pending
            .drain(..)
            .map(|command| session.apply(command))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::picsort_core::manifest::MediaItem;
    use crate::picsort_core::media::MediaKind;
    use std::path::PathBuf;

    #[test]
    fn test_keys_and_words() {
        assert_eq!(
            command_for_input("f"),
            Some(Command::SetDisposition(Disposition::Favorite))
        );
        assert_eq!(
            command_for_input(" Delete "),
            Some(Command::SetDisposition(Disposition::Delete))
        );
        assert_eq!(command_for_input("undo"), Some(Command::Undo));
        assert_eq!(
            command_for_input("video"),
            Some(Command::ChangeFilter(FilterMode::Video))
        );
        assert_eq!(command_for_input("?"), None);
        assert_eq!(command_for_input("keep"), None);
    }

    #[test]
    fn test_controller_only_fires_on_new_press() {
        let mut poller = ControllerPoller::default();
        let mut queue = CommandQueue::default();

        poller.sample(&[Button::A], &mut queue);
        poller.sample(&[Button::A], &mut queue);
        poller.sample(&[Button::A, Button::DPadRight], &mut queue);
        poller.sample(&[], &mut queue);
        poller.sample(&[Button::A], &mut queue);

        assert_eq!(queue.len(), 3);
    }

    #[test]
    fn test_shoulder_cycles_filters() {
        let mut poller = ControllerPoller::default();
        let mut queue = CommandQueue::default();
        for _ in 0..3 {
            poller.sample(&[Button::RightShoulder], &mut queue);
            poller.sample(&[], &mut queue);
        }
        let filters: Vec<Command> = queue.pending.iter().copied().collect();
        assert_eq!(
            filters,
            vec![
                Command::ChangeFilter(FilterMode::Image),
                Command::ChangeFilter(FilterMode::Video),
                Command::ChangeFilter(FilterMode::All),
            ]
        );
    }

    #[test]
    fn test_queue_drains_into_session() {
        let items = ["a.jpg", "b.jpg"]
            .iter()
            .map(|name| MediaItem {
                filename: name.to_string(),
                source_path: PathBuf::from(name),
                src: format!("/images/{}", name),
                kind: MediaKind::Image,
                capture_date: None,
                original_date: None,
                gps: None,
                disposition: Disposition::Undecided,
            })
            .collect();
        let mut session = TriageSession::new(items);
        let mut queue = CommandQueue::default();
        queue.push(Command::SetDisposition(Disposition::Like));
        queue.push(Command::SetDisposition(Disposition::Delete));
        queue.push(Command::Undo);

        let transitions = queue.drain_into(&mut session);
        assert_eq!(transitions.len(), 3);
        assert!(queue.is_empty());
        assert_eq!(session.items()[0].disposition, Disposition::Like);
        assert_eq!(session.items()[1].disposition, Disposition::Undecided);
    }
}
