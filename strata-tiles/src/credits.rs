use std::collections::HashMap;

/// A lightweight handle into a [`CreditSystem`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Credit(usize);

struct CreditRecord {
    html: String,
    show_on_screen: bool,
    last_frame: u64,
}

/// Collects attribution strings that must be shown for the current frame.
/// Owned by whoever drives the frame loop; there are no globals.
#[derive(Default)]
pub struct CreditSystem {
    records: Vec<CreditRecord>,
    by_html: HashMap<String, usize>,
    current_frame: Vec<usize>,
    frame_number: u64,
}

impl CreditSystem {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the existing credit for this snippet, or registers a new one.
    pub fn create_credit(&mut self, html: impl Into<String>, show_on_screen: bool) -> Credit {
        let html = html.into();
        if let Some(&index) = self.by_html.get(&html) {
            return Credit(index);
        }
        let index = self.records.len();
        self.records.push(CreditRecord {
            html: html.clone(),
            show_on_screen,
            last_frame: 0,
        });
        self.by_html.insert(html, index);
        Credit(index)
    }

    pub fn add_credit_to_frame(&mut self, credit: Credit) {
        let record = &mut self.records[credit.0];
        if record.last_frame != self.frame_number {
            record.last_frame = self.frame_number;
            self.current_frame.push(credit.0);
        }
    }

    pub fn start_next_frame(&mut self) {
        self.frame_number += 1;
        self.current_frame.clear();
    }

    pub fn html(&self, credit: Credit) -> &str {
        &self.records[credit.0].html
    }

    pub fn should_show_on_screen(&self, credit: Credit) -> bool {
        self.records[credit.0].show_on_screen
    }

    pub fn credits_to_show_this_frame(&self) -> Vec<Credit> {
        self.current_frame.iter().map(|&i| Credit(i)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_html_is_deduplicated() {
        let mut system = CreditSystem::new();
        let a = system.create_credit("© Example", true);
        let b = system.create_credit("© Example", true);
        assert_eq!(a, b);
    }

    #[test]
    fn frame_credits_reset_each_frame() {
        let mut system = CreditSystem::new();
        let a = system.create_credit("a", true);
        let b = system.create_credit("b", false);
        system.start_next_frame();
        system.add_credit_to_frame(a);
        system.add_credit_to_frame(a);
        system.add_credit_to_frame(b);
        assert_eq!(system.credits_to_show_this_frame(), vec![a, b]);
        system.start_next_frame();
        assert!(system.credits_to_show_this_frame().is_empty());
        system.add_credit_to_frame(b);
        assert_eq!(system.credits_to_show_this_frame(), vec![b]);
    }
}
