//! Structured Command Building
//!
//! Evaluates a stage's typed argument template into an argv vector. Values
//! are never spliced into a shell string, so quoting only matters when an
//! invocation is printed.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use serde::Serialize;

use super::layout::DirectoryLayout;
use super::model::{ArgPart, StageDef};
use crate::config::ParameterResolver;
use crate::error::Result;

/// A fully resolved external program call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Invocation {
    pub program: String,
    pub args: Vec<String>,
}

impl Invocation {
    /// Program followed by its arguments.
    pub fn argv(&self) -> Vec<String> {
        std::iter::once(self.program.clone())
            .chain(self.args.iter().cloned())
            .collect()
    }
}

impl fmt::Display for Invocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", quote(&self.program))?;
        for arg in &self.args {
            write!(f, " {}", quote(arg))?;
        }
        Ok(())
    }
}

fn quote(arg: &str) -> String {
    let plain = !arg.is_empty()
        && arg
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "-_./,:=+@%".contains(c));
    if plain {
        arg.to_string()
    } else {
        format!("'{}'", arg.replace('\'', r"'\''"))
    }
}

/// Everything known about one job when its command is built.
#[derive(Debug)]
pub struct CommandContext<'a> {
    pub stage: &'static StageDef,
    /// Sample, group or project name.
    pub instance: &'a str,
    /// Resolved paths per input slot.
    pub inputs: &'a BTreeMap<String, Vec<PathBuf>>,
    pub outputs: &'a [PathBuf],
    pub threads: usize,
}

/// Turns argument templates into [`Invocation`]s.
#[derive(Debug, Clone, Copy)]
pub struct CommandBuilder<'a> {
    resolver: ParameterResolver<'a>,
    layout: &'a DirectoryLayout,
}

impl<'a> CommandBuilder<'a> {
    pub fn new(resolver: ParameterResolver<'a>, layout: &'a DirectoryLayout) -> Self {
        Self { resolver, layout }
    }

    /// Evaluates the stage's argument template.
    ///
    /// Fails when a required parameter has neither a value nor a default.
    pub fn build(&self, ctx: &CommandContext<'_>) -> Result<Invocation> {
        let stage = ctx.stage;
        let mut args = Vec::new();

        for part in stage.args {
            match part {
                ArgPart::Lit(text) => args.push(text.to_string()),
                ArgPart::Input(slot) => {
                    args.extend(slot_paths(ctx, slot).iter().map(|p| display(p)));
                }
                ArgPart::Joined { slot, sep } => {
                    let joined: Vec<String> =
                        slot_paths(ctx, slot).iter().map(|p| display(p)).collect();
                    args.push(joined.join(*sep));
                }
                ArgPart::InputStripped { slot, suffix } => {
                    args.extend(slot_paths(ctx, slot).iter().map(|p| strip(&display(p), suffix)));
                }
                ArgPart::Output(index) => {
                    args.extend(ctx.outputs.get(*index).map(|p| display(p)));
                }
                ArgPart::OutputDir(index) => {
                    args.extend(
                        ctx.outputs
                            .get(*index)
                            .and_then(|p| p.parent())
                            .map(display),
                    );
                }
                ArgPart::OutputStripped { index, suffix } => {
                    args.extend(ctx.outputs.get(*index).map(|p| strip(&display(p), suffix)));
                }
                ArgPart::CategoryDir(category) => args.push(display(&self.layout.dir(*category))),
                ArgPart::Name => args.push(ctx.instance.to_string()),
                ArgPart::Param(flag) => {
                    args.extend(self.resolver.get_rule_param(stage.name, flag).into_args());
                }
                ArgPart::Required { key, flag } => {
                    let value = self.resolver.require(stage.name, key)?;
                    args.push(flag.to_string());
                    args.push(value.to_string());
                }
                ArgPart::Threads(flag) => {
                    args.push(flag.to_string());
                    args.push(ctx.threads.to_string());
                }
            }
        }

        Ok(Invocation {
            program: stage.program.to_string(),
            args,
        })
    }
}

fn slot_paths<'c>(ctx: &'c CommandContext<'_>, slot: &str) -> &'c [PathBuf] {
    ctx.inputs.get(slot).map(Vec::as_slice).unwrap_or(&[])
}

fn display(path: &Path) -> String {
    path.display().to_string()
}

fn strip(text: &str, suffix: &str) -> String {
    text.strip_suffix(suffix).unwrap_or(text).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConfigStore;
    use crate::error::WorkflowError;
    use crate::workflow::catalog::definition;
    use crate::workflow::layout::Category;
    use crate::workflow::model::WorkflowKind;
    use serde_json::json;

    fn layout() -> DirectoryLayout {
        DirectoryLayout::new(
            Path::new("/w"),
            &[Category::Fasta, Category::Contigs, Category::Taxonomy],
        )
    }

    #[test]
    fn test_reformat_fasta_invocation() {
        let store = ConfigStore::new(
            json!({"anvi_script_reformat_fasta": {"--min-len": 1000}}),
            crate::config::default_config(WorkflowKind::Contigs),
        );
        let layout = layout();
        let builder = CommandBuilder::new(ParameterResolver::new(&store), &layout);

        let stage = definition(WorkflowKind::Contigs)
            .stage("anvi_script_reformat_fasta")
            .unwrap();
        let inputs = BTreeMap::from([("fasta".to_string(), vec![PathBuf::from("/data/g1.fa")])]);
        let outputs = [
            PathBuf::from("/w/02_FASTA/g1/g1-contigs.fa"),
            PathBuf::from("/w/02_FASTA/g1/g1-reformat-report.txt"),
        ];
        let ctx = CommandContext {
            stage,
            instance: "g1",
            inputs: &inputs,
            outputs: &outputs,
            threads: 1,
        };

        let inv = builder.build(&ctx).unwrap();
        assert_eq!(
            inv.to_string(),
            "anvi-script-reformat-fasta /data/g1.fa -o /w/02_FASTA/g1/g1-contigs.fa \
             --report-file /w/02_FASTA/g1/g1-reformat-report.txt --min-len 1000 --simplify-names"
        );
    }

    #[test]
    fn test_joined_and_stripped_parts() {
        let defaults = crate::config::default_config(WorkflowKind::Metagenomics);
        let store = ConfigStore::from_defaults(defaults);
        let layout = layout();
        let builder = CommandBuilder::new(ParameterResolver::new(&store), &layout);
        let meta = definition(WorkflowKind::Metagenomics);

        let inputs = BTreeMap::from([
            ("r1".to_string(), vec![PathBuf::from("a_R1.fq"), PathBuf::from("b_R1.fq")]),
            ("r2".to_string(), vec![PathBuf::from("a_R2.fq"), PathBuf::from("b_R2.fq")]),
        ]);
        let outputs = [PathBuf::from("/w/02_FASTA/G/megahit/final.contigs.fa")];
        let inv = builder
            .build(&CommandContext {
                stage: meta.stage("megahit").unwrap(),
                instance: "G",
                inputs: &inputs,
                outputs: &outputs,
                threads: 8,
            })
            .unwrap();
        assert_eq!(
            inv.args[..6],
            ["-1", "a_R1.fq,b_R1.fq", "-2", "a_R2.fq,b_R2.fq", "-o", "/w/02_FASTA/G/megahit"]
        );
        assert!(inv.args.windows(2).any(|w| w == ["-t", "8"]));

        let outputs = [PathBuf::from("/w/04_MAPPING/G/G-contigs.1.bt2")];
        let inputs = BTreeMap::from([("contigs".to_string(), vec![PathBuf::from("G-contigs.fa")])]);
        let inv = builder
            .build(&CommandContext {
                stage: meta.stage("bowtie_build").unwrap(),
                instance: "G",
                inputs: &inputs,
                outputs: &outputs,
                threads: 4,
            })
            .unwrap();
        assert_eq!(inv.args.last().unwrap(), "/w/04_MAPPING/G/G-contigs");
    }

    #[test]
    fn test_required_parameter_missing() {
        let defaults = crate::config::default_config(WorkflowKind::Contigs);
        let store = ConfigStore::from_defaults(defaults);
        let layout = layout();
        let builder = CommandBuilder::new(ParameterResolver::new(&store), &layout);
        let inputs = BTreeMap::new();
        let outputs = [PathBuf::from("hits.tsv"), PathBuf::from("report.tsv")];

        let err = builder
            .build(&CommandContext {
                stage: definition(WorkflowKind::Contigs).stage("centrifuge").unwrap(),
                instance: "g1",
                inputs: &inputs,
                outputs: &outputs,
                threads: 1,
            })
            .unwrap_err();
        assert!(matches!(err, WorkflowError::MissingParameter { ref stage, ref param }
            if stage == "centrifuge" && param == "db"));
    }

    #[test]
    fn test_display_quotes_when_needed() {
        let inv = Invocation {
            program: "anvi-merge".to_string(),
            args: vec!["my profile.db".to_string(), "-S".to_string(), "it's".to_string()],
        };
        assert_eq!(inv.to_string(), r"anvi-merge 'my profile.db' -S 'it'\''s'");
        assert_eq!(inv.argv().len(), 4);
    }
}
