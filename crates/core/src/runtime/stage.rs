/// Pipeline stages of one turn, in nominal order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    LoadMemory,
    Appraise,
    Orchestrate,
    ToolGateway,
    UpdateAffect,
    GenerateReply,
    SelfCheck,
    UpdateHistory,
    Summarize,
    SaveMemory,
    End,
}

/// Branch inputs read by [`next_stage`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Flags {
    pub tool_required: bool,
    pub tool_iterations: u32,
    pub max_tool_iterations: u32,
    pub valid: bool,
    pub retry_count: u32,
    pub max_retries: u32,
}

/// Typed transition function.
///
/// Two cycles exist: Orchestrate ↔ ToolGateway, capped by `max_tool_iterations`,
/// and SelfCheck → GenerateReply, capped by `max_retries`.
pub fn next_stage(stage: Stage, flags: Flags) -> Stage {
    match stage {
        Stage::LoadMemory => Stage::Appraise,
        Stage::Appraise => Stage::Orchestrate,
        Stage::Orchestrate => {
            if flags.tool_required && flags.tool_iterations < flags.max_tool_iterations {
                Stage::ToolGateway
            } else {
                Stage::UpdateAffect
            }
        }
        Stage::ToolGateway => Stage::Orchestrate,
        Stage::UpdateAffect => Stage::GenerateReply,
        Stage::GenerateReply => Stage::SelfCheck,
        Stage::SelfCheck => {
            if flags.valid || flags.retry_count >= flags.max_retries {
                Stage::UpdateHistory
            } else {
                Stage::GenerateReply
            }
        }
        Stage::UpdateHistory => Stage::Summarize,
        Stage::Summarize => Stage::SaveMemory,
        Stage::SaveMemory | Stage::End => Stage::End,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn flags() -> Flags {
        Flags {
            max_tool_iterations: 2,
            max_retries: 2,
            ..Flags::default()
        }
    }

    #[test]
    fn linear_path_without_tools() {
        let mut stage = Stage::LoadMemory;
        let mut seen = vec![stage];
        let f = Flags { valid: true, ..flags() };
        while stage != Stage::End {
            stage = next_stage(stage, f);
            seen.push(stage);
        }
        assert_eq!(
            seen,
            vec![
                Stage::LoadMemory,
                Stage::Appraise,
                Stage::Orchestrate,
                Stage::UpdateAffect,
                Stage::GenerateReply,
                Stage::SelfCheck,
                Stage::UpdateHistory,
                Stage::Summarize,
                Stage::SaveMemory,
                Stage::End,
            ]
        );
    }

    #[test]
    fn tool_edge_respects_cap() {
        let f = Flags { tool_required: true, ..flags() };
        assert_eq!(next_stage(Stage::Orchestrate, f), Stage::ToolGateway);
        assert_eq!(next_stage(Stage::ToolGateway, f), Stage::Orchestrate);
        let capped = Flags { tool_iterations: 2, ..f };
        assert_eq!(next_stage(Stage::Orchestrate, capped), Stage::UpdateAffect);
    }

    #[test]
    fn self_check_retries_until_bound() {
        assert_eq!(next_stage(Stage::SelfCheck, flags()), Stage::GenerateReply);
        let exhausted = Flags { retry_count: 2, ..flags() };
        assert_eq!(next_stage(Stage::SelfCheck, exhausted), Stage::UpdateHistory);
        let valid = Flags { valid: true, ..flags() };
        assert_eq!(next_stage(Stage::SelfCheck, valid), Stage::UpdateHistory);
    }

    #[test]
    fn end_is_terminal() {
        assert_eq!(next_stage(Stage::End, flags()), Stage::End);
    }
}
