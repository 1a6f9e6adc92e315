//! The instruction protocol: what a plugin hook tells the proxy to do next.

use serde_json::Value;

/// Instruction kinds a hook can return. The first actionable (non
/// `DoNothing`) instruction in dispatch order wins and short-circuits
/// normal proxying.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Instruction {
    #[default]
    DoNothing,
    /// Answer the client with a redirect instead of proxying.
    RedirectToNewUrl,
    /// Replace the requested resource before forwarding.
    RewriteRequest,
    /// Drop the request and close the connection.
    DropRequest,
}

/// Parameter bag attached to an instruction. Parameters are meaningful
/// only for the kinds that declare them; `DoNothing` carries none.
#[derive(Debug, Clone, Default)]
pub struct InstructionParameters {
    /// Replacement resource (redirect target or rewritten path).
    pub replacement_resource: String,
    /// Status code for crafted responses.
    pub status: u16,
    pub status_description: String,
    /// Opaque plugin-specific payload.
    pub opaque: Option<Value>,
}

/// What a plugin hook returned.
#[derive(Debug, Clone, Default)]
pub struct PluginInstruction {
    pub instruction: Instruction,
    pub parameters: InstructionParameters,
}

impl PluginInstruction {
    pub fn do_nothing() -> Self {
        Self::default()
    }

    pub fn redirect(
        resource: impl Into<String>,
        status: u16,
        description: impl Into<String>,
    ) -> Self {
        Self {
            instruction: Instruction::RedirectToNewUrl,
            parameters: InstructionParameters {
                replacement_resource: resource.into(),
                status,
                status_description: description.into(),
                opaque: None,
            },
        }
    }

    pub fn rewrite(resource: impl Into<String>) -> Self {
        Self {
            instruction: Instruction::RewriteRequest,
            parameters: InstructionParameters {
                replacement_resource: resource.into(),
                ..Default::default()
            },
        }
    }

    pub fn drop_request() -> Self {
        Self {
            instruction: Instruction::DropRequest,
            parameters: InstructionParameters::default(),
        }
    }

    /// Whether this instruction stops the dispatch scan.
    pub fn is_actionable(&self) -> bool {
        self.instruction != Instruction::DoNothing
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_do_nothing_carries_no_parameters() {
        let instruction = PluginInstruction::do_nothing();
        assert!(!instruction.is_actionable());
        assert!(instruction.parameters.replacement_resource.is_empty());
        assert_eq!(instruction.parameters.status, 0);
        assert!(instruction.parameters.opaque.is_none());
    }

    #[test]
    fn test_redirect_instruction() {
        let instruction =
            PluginInstruction::redirect("https://new.example.com/a", 301, "Moved Permanently");
        assert!(instruction.is_actionable());
        assert_eq!(instruction.instruction, Instruction::RedirectToNewUrl);
        assert_eq!(
            instruction.parameters.replacement_resource,
            "https://new.example.com/a"
        );
        assert_eq!(instruction.parameters.status, 301);
        assert_eq!(instruction.parameters.status_description, "Moved Permanently");
    }

    #[test]
    fn test_rewrite_and_drop_are_actionable() {
        assert!(PluginInstruction::rewrite("/other").is_actionable());
        assert!(PluginInstruction::drop_request().is_actionable());
    }
}
