use subtle::ConstantTimeEq;
use zeroize::{Zeroize, ZeroizeOnDrop};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitDecision {
    Allowed,
    WrongPassword,
}

/// Holds the teacher password captured at authorization so leaving
/// lockdown needs it again. The bytes are wiped on drop.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct ExitGate {
    secret: Option<Vec<u8>>,
}

impl ExitGate {
    pub fn new(captured: Option<&str>) -> Self {
        Self {
            secret: captured
                .filter(|p| !p.is_empty())
                .map(|p| p.as_bytes().to_vec()),
        }
    }

    pub fn is_protected(&self) -> bool {
        self.secret.is_some()
    }

    pub fn check(&self, attempt: &str) -> ExitDecision {
        let Some(secret) = &self.secret else {
            return ExitDecision::Allowed;
        };
        if bool::from(attempt.as_bytes().ct_eq(secret.as_slice())) {
            ExitDecision::Allowed
        } else {
            ExitDecision::WrongPassword
        }
    }
}

impl std::fmt::Debug for ExitGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExitGate")
            .field("protected", &self.is_protected())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_needs_the_captured_password() {
        let gate = ExitGate::new(Some("s3cret!"));
        assert!(gate.is_protected());
        assert_eq!(gate.check("s3cret"), ExitDecision::WrongPassword);
        assert_eq!(gate.check("S3CRET!"), ExitDecision::WrongPassword);
        assert_eq!(gate.check(""), ExitDecision::WrongPassword);
        assert_eq!(gate.check("s3cret!"), ExitDecision::Allowed);
    }

    #[test]
    fn nothing_captured_allows_exit() {
        assert_eq!(ExitGate::new(None).check("anything"), ExitDecision::Allowed);
        assert!(!ExitGate::new(Some("")).is_protected());
    }

    #[test]
    fn debug_output_hides_the_secret() {
        let gate = ExitGate::new(Some("hunter2"));
        assert!(!format!("{gate:?}").contains("hunter2"));
    }
}
