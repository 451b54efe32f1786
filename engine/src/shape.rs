use std::fmt;

use shakmaty::{Role, Square};

/// A move abstracted to (piece type, origin, destination); promotion choice
/// and printed notation do not distinguish shapes.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct MoveShape {
    pub role: Role,
    pub from: Square,
    pub to: Square,
}

impl fmt::Display for MoveShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{}{}",
            self.role.upper_char(),
            self.from,
            self.to
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn displays_piece_and_squares() {
        let shape = MoveShape {
            role: Role::Knight,
            from: Square::G1,
            to: Square::F3,
        };
        assert_eq!(shape.to_string(), "Ng1f3");
    }
}
