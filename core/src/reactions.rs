/// Reaction reducer: toggle semantics over emoji -> reactor sets
use crate::model::Reactions;

/// Result of a local toggle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Toggle {
    Added,
    Removed,
}

/// Flip `user_name`'s membership in the reactor set for `emoji`.
///
/// Applying the same toggle twice restores the original reactions.
pub fn toggle(reactions: &mut Reactions, emoji: &str, user_name: &str) -> Toggle {
    if reactions.remove(emoji, user_name) {
        Toggle::Removed
    } else {
        reactions.insert(emoji, user_name);
        Toggle::Added
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_toggle_adds_then_removes() {
        let mut reactions = Reactions::new();
        assert_eq!(toggle(&mut reactions, "👍", "Ada"), Toggle::Added);
        assert!(reactions.contains("👍", "Ada"));
        assert_eq!(toggle(&mut reactions, "👍", "Ada"), Toggle::Removed);
        assert!(reactions.is_empty());
    }

    #[test]
    fn test_double_toggle_restores_original() {
        let mut reactions = Reactions::new();
        reactions.insert("🎉", "Grace");
        reactions.insert("👍", "Ada");
        let original = reactions.clone();

        for (emoji, user) in [("🎉", "Ada"), ("🎉", "Grace"), ("👍", "Ada"), ("🔥", "Linus")] {
            toggle(&mut reactions, emoji, user);
            toggle(&mut reactions, emoji, user);
            assert_eq!(reactions, original);
        }
    }

    #[test]
    fn test_other_reactors_are_untouched() {
        let mut reactions = Reactions::new();
        reactions.insert("👍", "Grace");
        toggle(&mut reactions, "👍", "Ada");
        toggle(&mut reactions, "👍", "Ada");
        assert!(reactions.contains("👍", "Grace"));
        assert_eq!(reactions.reactors("👍").unwrap().len(), 1);
    }
}
