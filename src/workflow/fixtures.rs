//! Small stage catalogs shared by the unit tests.

use super::layout::Category;
use super::model::{ArgPart, InputSlot, ParamDef, Scope, StageDef, StageSpec, WorkflowKind};

pub const fn group_stage(name: &'static str, program: &'static str) -> StageDef {
    StageDef {
        name,
        description: "",
        category: Category::Contigs,
        scope: Scope::Group,
        program,
        requires: &[],
        default_enabled: true,
        default_threads: 1,
        params: &[],
        inputs: &[],
        outputs: &[],
        args: &[],
    }
}

/// `stage_a -> stage_b -> stage_c`, each reading the previous one's output.
pub static CHAIN: [StageDef; 3] = [
    StageDef {
        requires: &["tool-a-helper"],
        inputs: &[InputSlot::raw("fasta", "path")],
        outputs: &["{group}/a.out"],
        params: &[ParamDef::int("--min-len", 0)],
        args: &[ArgPart::Input("fasta"), ArgPart::Output(0), ArgPart::Param("--min-len")],
        ..group_stage("stage_a", "tool-a")
    },
    StageDef {
        inputs: &[InputSlot::from("in", &["stage_a"], "path")],
        outputs: &["{group}/b.out"],
        args: &[ArgPart::Input("in"), ArgPart::Output(0)],
        ..group_stage("stage_b", "tool-b")
    },
    StageDef {
        default_threads: 3,
        inputs: &[InputSlot::from("in", &["stage_b"], "path")],
        outputs: &["{group}/c.out"],
        args: &[ArgPart::Input("in"), ArgPart::Output(0), ArgPart::Threads("-T")],
        ..group_stage("stage_c", "tool-c")
    },
];

pub fn chain_specs() -> Vec<StageSpec> {
    CHAIN
        .iter()
        .map(|def| StageSpec::new(def, WorkflowKind::Contigs))
        .collect()
}
