use form_core::FieldKind;

/// Single-line text input. The cursor counts chars, not bytes.
#[derive(Debug, Default)]
pub struct TextInputState {
    value: String,
    cursor: usize,
}

impl TextInputState {
    pub fn new(value: String) -> Self {
        let cursor = value.chars().count();
        Self { value, cursor }
    }

    pub fn value(&self) -> &str {
        &self.value
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    fn byte_offset(&self, cursor: usize) -> usize {
        self.value
            .char_indices()
            .nth(cursor)
            .map_or(self.value.len(), |(offset, _)| offset)
    }

    fn char_len(&self) -> usize {
        self.value.chars().count()
    }

    pub fn insert(&mut self, c: char) {
        let offset = self.byte_offset(self.cursor);
        self.value.insert(offset, c);
        self.cursor += 1;
    }

    pub fn backspace(&mut self) {
        if self.cursor > 0 {
            self.cursor -= 1;
            let offset = self.byte_offset(self.cursor);
            self.value.remove(offset);
        }
    }

    pub fn delete(&mut self) {
        if self.cursor < self.char_len() {
            let offset = self.byte_offset(self.cursor);
            self.value.remove(offset);
        }
    }

    pub fn move_left(&mut self) {
        self.cursor = self.cursor.saturating_sub(1);
    }

    pub fn move_right(&mut self) {
        if self.cursor < self.char_len() {
            self.cursor += 1;
        }
    }

    pub fn move_home(&mut self) {
        self.cursor = 0;
    }

    pub fn move_end(&mut self) {
        self.cursor = self.char_len();
    }

    /// Value with a `|` at the cursor. Passwords render as `*`.
    pub fn display_with_cursor(&self, masked: bool) -> String {
        let mut result: String = if masked {
            "*".repeat(self.char_len())
        } else {
            self.value.clone()
        };
        let offset = result
            .char_indices()
            .nth(self.cursor)
            .map_or(result.len(), |(offset, _)| offset);
        result.insert(offset, '|');
        result
    }
}

/// Which characters an input accepts while typing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationMode {
    None,
    Float,
    Email,
}

impl ValidationMode {
    pub fn for_kind(kind: FieldKind) -> Self {
        match kind {
            FieldKind::Number => ValidationMode::Float,
            FieldKind::Email => ValidationMode::Email,
            _ => ValidationMode::None,
        }
    }

    pub fn validate(&self, c: char) -> bool {
        match self {
            ValidationMode::None => true,
            ValidationMode::Float => c.is_ascii_digit() || c == '-' || c == '.',
            ValidationMode::Email => !c.is_whitespace(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_text_input_basic() {
        let mut input = TextInputState::new(String::new());
        for c in "hello".chars() {
            input.insert(c);
        }
        assert_eq!(input.value(), "hello");
        assert_eq!(input.cursor(), 5);
    }

    #[test]
    fn test_text_input_backspace() {
        let mut input = TextInputState::new("hello".to_string());
        input.backspace();
        assert_eq!(input.value(), "hell");
    }

    #[test]
    fn test_multibyte_editing() {
        let mut input = TextInputState::new("café".to_string());
        assert_eq!(input.cursor(), 4);
        input.move_left();
        input.insert('f');
        assert_eq!(input.value(), "caffé");
        input.move_end();
        input.backspace();
        assert_eq!(input.value(), "caff");
        input.move_home();
        input.delete();
        assert_eq!(input.value(), "aff");
    }

    #[test]
    fn test_text_input_cursor_movement() {
        let mut input = TextInputState::new("hello".to_string());
        input.move_left();
        assert_eq!(input.cursor(), 4);
        input.move_home();
        input.move_left();
        assert_eq!(input.cursor(), 0);
        input.move_end();
        input.move_right();
        assert_eq!(input.cursor(), 5);
    }

    #[test]
    fn test_display_with_cursor() {
        let mut input = TextInputState::new("pw".to_string());
        assert_eq!(input.display_with_cursor(false), "pw|");
        input.move_left();
        assert_eq!(input.display_with_cursor(true), "*|*");
    }

    #[test]
    fn test_validation_modes() {
        assert_eq!(ValidationMode::for_kind(FieldKind::Number), ValidationMode::Float);
        assert!(ValidationMode::Float.validate('.'));
        assert!(!ValidationMode::Float.validate('a'));
        assert!(!ValidationMode::Email.validate(' '));
        assert!(ValidationMode::None.validate(' '));
    }
}
