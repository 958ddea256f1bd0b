//! Workflow Catalog
//!
//! Static stage definitions of every workflow. Stages are listed in
//! dependency order; the validator checks that every producer a stage
//! names exists in the composed workflow.

use super::layout::Category;
use super::model::ArgPart::{self, Input, Lit, Name, Output, OutputDir, Param, Threads};
use super::model::{
    Embedding, ExclusiveParams, ExclusiveStages, InputSlot, ManifestSpec, ParamDef, Scope, StageDef,
    WorkflowDefinition, WorkflowKind,
};

/// Returns the static definition of a workflow.
pub fn definition(kind: WorkflowKind) -> &'static WorkflowDefinition {
    match kind {
        WorkflowKind::Contigs => &CONTIGS,
        WorkflowKind::Metagenomics => &METAGENOMICS,
        WorkflowKind::Pangenomics => &PANGENOMICS,
    }
}

const fn stage(
    name: &'static str,
    description: &'static str,
    category: Category,
    scope: Scope,
    program: &'static str,
) -> StageDef {
    StageDef {
        name,
        description,
        category,
        scope,
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

const CONTIGS_DB: InputSlot = InputSlot::from("contigs_db", &["anvi_gen_contigs_database"], "path");
const HMMS_DONE: InputSlot = InputSlot::from("hmms", &["anvi_run_hmms"], "path").ordering();

// ---------------------------------------------------------------------------
// contigs
// ---------------------------------------------------------------------------

static CONTIGS_STAGES: [StageDef; 10] = [
    StageDef {
        inputs: &[InputSlot::raw("fasta", "path")],
        outputs: &["{group}/{group}-contigs.fa", "{group}/{group}-reformat-report.txt"],
        params: &[
            ParamDef::int("--min-len", 0),
            ParamDef::switch("--simplify-names", true),
            ParamDef::unset("--exclude-ids"),
        ],
        args: &[
            Input("fasta"),
            Lit("-o"),
            Output(0),
            Lit("--report-file"),
            Output(1),
            Param("--min-len"),
            Param("--simplify-names"),
            Param("--exclude-ids"),
        ],
        ..stage(
            "anvi_script_reformat_fasta",
            "Simplify deflines and drop short contigs",
            Category::Fasta,
            Scope::Group,
            "anvi-script-reformat-fasta",
        )
    },
    StageDef {
        inputs: &[InputSlot::from("fasta", &["anvi_script_reformat_fasta"], "path")],
        outputs: &["{group}/{group}-contigs.db"],
        params: &[
            ParamDef::switch("--skip-gene-calling", false),
            ParamDef::unset("--split-length"),
            ParamDef::unset("--external-gene-calls"),
        ],
        args: &[
            Lit("-f"),
            Input("fasta"),
            Lit("-o"),
            Output(0),
            Lit("-n"),
            Name,
            Threads("-T"),
            Param("--skip-gene-calling"),
            Param("--split-length"),
            Param("--external-gene-calls"),
        ],
        ..stage(
            "anvi_gen_contigs_database",
            "Build the contigs database",
            Category::Contigs,
            Scope::Group,
            "anvi-gen-contigs-database",
        )
    },
    StageDef {
        default_threads: 2,
        inputs: &[CONTIGS_DB],
        outputs: &["{group}/anvi_run_hmms.done"],
        params: &[
            ParamDef::unset("--installed-hmm-profile"),
            ParamDef::switch("--also-scan-trnas", false),
        ],
        args: &[
            Lit("-c"),
            Input("contigs_db"),
            Threads("-T"),
            Param("--installed-hmm-profile"),
            Param("--also-scan-trnas"),
        ],
        ..stage(
            "anvi_run_hmms",
            "Search the built-in HMM profiles",
            Category::Contigs,
            Scope::Group,
            "anvi-run-hmms",
        )
    },
    StageDef {
        requires: &["diamond"],
        default_enabled: false,
        inputs: &[CONTIGS_DB],
        outputs: &["{group}/anvi_run_ncbi_cogs.done"],
        params: &[ParamDef::unset("--cog-data-dir"), ParamDef::switch("--sensitive", false)],
        args: &[
            Lit("-c"),
            Input("contigs_db"),
            Threads("-T"),
            Param("--cog-data-dir"),
            Param("--sensitive"),
        ],
        ..stage(
            "anvi_run_ncbi_cogs",
            "Annotate genes with NCBI COGs",
            Category::Contigs,
            Scope::Group,
            "anvi-run-ncbi-cogs",
        )
    },
    StageDef {
        default_enabled: false,
        inputs: &[CONTIGS_DB, HMMS_DONE],
        outputs: &["{group}/anvi_run_scg_taxonomy.done"],
        params: &[ParamDef::unset("--scgs-taxonomy-data-dir")],
        args: &[
            Lit("-c"),
            Input("contigs_db"),
            Threads("-T"),
            Param("--scgs-taxonomy-data-dir"),
        ],
        ..stage(
            "anvi_run_scg_taxonomy",
            "Assign taxonomy from single-copy core genes",
            Category::Taxonomy,
            Scope::Group,
            "anvi-run-scg-taxonomy",
        )
    },
    StageDef {
        requires: &["hmmsearch"],
        default_enabled: false,
        inputs: &[CONTIGS_DB],
        outputs: &["{group}/anvi_run_kegg_kofams.done"],
        params: &[ParamDef::unset("--kegg-data-dir")],
        args: &[Lit("-c"), Input("contigs_db"), Threads("-T"), Param("--kegg-data-dir")],
        ..stage(
            "anvi_run_kegg_kofams",
            "Annotate genes with KEGG KOfams",
            Category::Contigs,
            Scope::Group,
            "anvi-run-kegg-kofams",
        )
    },
    StageDef {
        requires: &["hmmsearch"],
        default_enabled: false,
        inputs: &[CONTIGS_DB],
        outputs: &["{group}/anvi_run_pfams.done"],
        params: &[ParamDef::unset("--pfam-data-dir")],
        args: &[Lit("-c"), Input("contigs_db"), Threads("-T"), Param("--pfam-data-dir")],
        ..stage(
            "anvi_run_pfams",
            "Annotate genes with Pfam",
            Category::Contigs,
            Scope::Group,
            "anvi-run-pfams",
        )
    },
    StageDef {
        default_enabled: false,
        inputs: &[CONTIGS_DB],
        outputs: &["{group}/{group}-gene-calls.fa"],
        params: &[ParamDef::switch("--get-aa-sequences", false)],
        args: &[
            Lit("-c"),
            Input("contigs_db"),
            Lit("-o"),
            Output(0),
            Param("--get-aa-sequences"),
        ],
        ..stage(
            "anvi_export_gene_calls",
            "Export gene call sequences",
            Category::Contigs,
            Scope::Group,
            "anvi-get-sequences-for-gene-calls",
        )
    },
    StageDef {
        default_enabled: false,
        inputs: &[InputSlot::from("genes", &["anvi_export_gene_calls"], "path")],
        outputs: &["{group}/centrifuge_hits.tsv", "{group}/centrifuge_report.tsv"],
        params: &[ParamDef::unset("db")],
        args: &[
            Lit("-f"),
            ArgPart::Required { key: "db", flag: "-x" },
            Lit("-U"),
            Input("genes"),
            Lit("-S"),
            Output(0),
            Lit("--report-file"),
            Output(1),
            Threads("-p"),
        ],
        ..stage(
            "centrifuge",
            "Classify gene calls with centrifuge",
            Category::Taxonomy,
            Scope::Group,
            "centrifuge",
        )
    },
    StageDef {
        default_enabled: false,
        inputs: &[
            InputSlot::from("hits", &["centrifuge"], "path"),
            InputSlot::from("report", &["centrifuge"], "path").nth(1),
            CONTIGS_DB,
        ],
        outputs: &["{group}/anvi_import_taxonomy_for_genes.done"],
        args: &[
            Lit("-c"),
            Input("contigs_db"),
            Lit("-i"),
            Input("hits"),
            Input("report"),
            Lit("-p"),
            Lit("centrifuge"),
        ],
        ..stage(
            "anvi_import_taxonomy_for_genes",
            "Import centrifuge gene taxonomy",
            Category::Taxonomy,
            Scope::Group,
            "anvi-import-taxonomy-for-genes",
        )
    },
];

static CONTIGS: WorkflowDefinition = WorkflowDefinition {
    kind: WorkflowKind::Contigs,
    description: "Contigs databases and their annotation",
    stages: &CONTIGS_STAGES,
    categories: &[Category::Logs, Category::Fasta, Category::Contigs, Category::Taxonomy],
    manifest: ManifestSpec {
        key: "fasta_txt",
        default_path: "fasta.txt",
        name_column: "name",
        group_column: None,
        file_columns: &["path"],
    },
    required_keys: &[],
    exclusive_stages: &[],
    exclusive_params: &[],
    embeds: None,
};

// ---------------------------------------------------------------------------
// metagenomics
// ---------------------------------------------------------------------------

const QC_R1: InputSlot = InputSlot::from("r1", &["iu_filter_quality_minoche"], "r1");
const QC_R2: InputSlot = InputSlot::from("r2", &["iu_filter_quality_minoche"], "r2").nth(1);

static METAGENOMICS_STAGES: [StageDef; 11] = [
    StageDef {
        requires: &["iu-gen-configs"],
        inputs: &[InputSlot::raw("r1", "r1"), InputSlot::raw("r2", "r2").forwarding(1)],
        outputs: &[
            "{sample}/{sample}-QUALITY_PASSED_R1.fastq.gz",
            "{sample}/{sample}-QUALITY_PASSED_R2.fastq.gz",
            "{sample}/{sample}-STATS.txt",
        ],
        params: &[
            ParamDef::switch("--visualize-quality-curves", false),
            ParamDef::switch("--ignore-deflines", true),
        ],
        args: &[
            Lit("--r1"),
            Input("r1"),
            Lit("--r2"),
            Input("r2"),
            Lit("--output-dir"),
            OutputDir(0),
            Lit("--sample-name"),
            Name,
            Param("--visualize-quality-curves"),
            Param("--ignore-deflines"),
        ],
        ..stage(
            "iu_filter_quality_minoche",
            "Quality-filter paired-end reads",
            Category::Qc,
            Scope::Sample,
            "iu-filter-quality-minoche",
        )
    },
    StageDef {
        inputs: &[QC_R1, QC_R2],
        outputs: &["{group}/megahit/final.contigs.fa"],
        params: &[ParamDef::int("--min-contig-len", 1000), ParamDef::unset("--presets")],
        args: &[
            Lit("-1"),
            ArgPart::Joined { slot: "r1", sep: "," },
            Lit("-2"),
            ArgPart::Joined { slot: "r2", sep: "," },
            Lit("-o"),
            OutputDir(0),
            Threads("-t"),
            Param("--min-contig-len"),
            Param("--presets"),
        ],
        ..stage(
            "megahit",
            "Co-assemble each group with MEGAHIT",
            Category::Fasta,
            Scope::Group,
            "megahit",
        )
    },
    StageDef {
        default_enabled: false,
        inputs: &[QC_R1, QC_R2],
        outputs: &["{group}/metaspades/contigs.fasta"],
        params: &[ParamDef::unset("-k")],
        args: &[
            Lit("-1"),
            Input("r1"),
            Lit("-2"),
            Input("r2"),
            Lit("-o"),
            OutputDir(0),
            Threads("-t"),
            Param("-k"),
        ],
        ..stage(
            "metaspades",
            "Co-assemble each group with metaSPAdes",
            Category::Fasta,
            Scope::Group,
            "metaspades.py",
        )
    },
    StageDef {
        requires: &["fq2fa"],
        default_enabled: false,
        inputs: &[QC_R1, QC_R2.ordering()],
        outputs: &["{group}/idba_ud/contig.fa"],
        params: &[ParamDef::unset("--min_contig")],
        args: &[
            Lit("-r"),
            Input("r1"),
            Lit("-o"),
            OutputDir(0),
            Threads("--num_threads"),
            Param("--min_contig"),
        ],
        ..stage(
            "idba_ud",
            "Co-assemble each group with IDBA-UD",
            Category::Fasta,
            Scope::Group,
            "idba_ud",
        )
    },
    StageDef {
        default_enabled: false,
        inputs: &[QC_R1, QC_R2],
        outputs: &["{sample}/{sample}-krakenuniq.txt"],
        params: &[ParamDef::unset("--db"), ParamDef::switch("--gzip-compressed", true)],
        args: &[
            ArgPart::Required { key: "--db", flag: "--db" },
            Threads("--threads"),
            Lit("--report-file"),
            Output(0),
            Param("--gzip-compressed"),
            Lit("--paired"),
            Input("r1"),
            Input("r2"),
        ],
        ..stage(
            "krakenuniq",
            "Classify short reads with KrakenUniq",
            Category::Taxonomy,
            Scope::Sample,
            "krakenuniq",
        )
    },
    StageDef {
        default_threads: 4,
        inputs: &[InputSlot::from("contigs", &["anvi_script_reformat_fasta"], "path")],
        outputs: &["{group}/{group}-contigs.1.bt2"],
        args: &[
            Threads("--threads"),
            Input("contigs"),
            ArgPart::OutputStripped { index: 0, suffix: ".1.bt2" },
        ],
        ..stage(
            "bowtie_build",
            "Index the co-assembly",
            Category::Mapping,
            Scope::Group,
            "bowtie2-build",
        )
    },
    StageDef {
        default_threads: 4,
        inputs: &[
            QC_R1,
            QC_R2,
            InputSlot::from("index", &["bowtie_build"], "path"),
        ],
        outputs: &["{sample}/{sample}.sam"],
        params: &[ParamDef::switch("--no-unal", true)],
        args: &[
            Threads("--threads"),
            Lit("-x"),
            ArgPart::InputStripped { slot: "index", suffix: ".1.bt2" },
            Lit("-1"),
            Input("r1"),
            Lit("-2"),
            Input("r2"),
            Param("--no-unal"),
            Lit("-S"),
            Output(0),
        ],
        ..stage(
            "bowtie",
            "Map each sample against its group's co-assembly",
            Category::Mapping,
            Scope::Sample,
            "bowtie2",
        )
    },
    StageDef {
        inputs: &[InputSlot::from("sam", &["bowtie"], "r1")],
        outputs: &["{sample}/{sample}-RAW.bam"],
        params: &[ParamDef::int("-F", 4)],
        args: &[
            Lit("view"),
            Lit("-bS"),
            Param("-F"),
            Input("sam"),
            Lit("-o"),
            Output(0),
        ],
        ..stage(
            "samtools_view",
            "Convert SAM to BAM",
            Category::Mapping,
            Scope::Sample,
            "samtools",
        )
    },
    StageDef {
        inputs: &[InputSlot::from("raw_bam", &["samtools_view"], "r1")],
        outputs: &["{sample}/{sample}.bam", "{sample}/{sample}.bam.bai"],
        args: &[Input("raw_bam"), Lit("-o"), Output(0)],
        ..stage(
            "anvi_init_bam",
            "Sort and index the BAM file",
            Category::Mapping,
            Scope::Sample,
            "anvi-init-bam",
        )
    },
    StageDef {
        default_threads: 2,
        inputs: &[
            InputSlot::from("bam", &["anvi_init_bam"], "r1"),
            CONTIGS_DB,
            HMMS_DONE,
        ],
        outputs: &["{sample}/PROFILE.db"],
        params: &[
            ParamDef::int("--min-contig-length", 1000),
            ParamDef::switch("--profile-SCVs", false),
        ],
        args: &[
            Lit("-i"),
            Input("bam"),
            Lit("-c"),
            Input("contigs_db"),
            Lit("-o"),
            OutputDir(0),
            Lit("-S"),
            Name,
            Threads("-T"),
            Param("--min-contig-length"),
            Param("--profile-SCVs"),
        ],
        ..stage(
            "anvi_profile",
            "Profile each sample's mapping",
            Category::Profile,
            Scope::Sample,
            "anvi-profile",
        )
    },
    StageDef {
        inputs: &[
            InputSlot::from("profiles", &["anvi_profile"], "r1"),
            CONTIGS_DB,
        ],
        outputs: &["{group}/PROFILE.db"],
        params: &[
            ParamDef::switch("--skip-hierarchical-clustering", false),
            ParamDef::switch("--enforce-hierarchical-clustering", false),
        ],
        args: &[
            Input("profiles"),
            Lit("-c"),
            Input("contigs_db"),
            Lit("-o"),
            OutputDir(0),
            Lit("-S"),
            Name,
            Param("--skip-hierarchical-clustering"),
            Param("--enforce-hierarchical-clustering"),
        ],
        ..stage(
            "anvi_merge",
            "Merge the profiles of each group",
            Category::Merge,
            Scope::Group,
            "anvi-merge",
        )
    },
];

static METAGENOMICS: WorkflowDefinition = WorkflowDefinition {
    kind: WorkflowKind::Metagenomics,
    description: "Read QC, co-assembly, mapping and profiling of metagenomes",
    stages: &METAGENOMICS_STAGES,
    categories: &[
        Category::Logs,
        Category::Qc,
        Category::Fasta,
        Category::Mapping,
        Category::Profile,
        Category::Merge,
        Category::Taxonomy,
    ],
    manifest: ManifestSpec {
        key: "samples_txt",
        default_path: "samples.txt",
        name_column: "sample",
        group_column: Some("group"),
        file_columns: &["r1", "r2"],
    },
    required_keys: &[],
    exclusive_stages: &[ExclusiveStages {
        stages: &["megahit", "metaspades", "idba_ud"],
        min: 1,
        max: 1,
    }],
    exclusive_params: &[ExclusiveParams {
        stage: "anvi_merge",
        flags: &["--skip-hierarchical-clustering", "--enforce-hierarchical-clustering"],
    }],
    embeds: Some(Embedding {
        kind: WorkflowKind::Contigs,
        entry: &["megahit", "metaspades", "idba_ud"],
    }),
};

// ---------------------------------------------------------------------------
// pangenomics
// ---------------------------------------------------------------------------

const GENOMES_FILE: InputSlot =
    InputSlot::from("genomes_file", &["anvi_script_gen_genomes_file"], "path");

static PANGENOMICS_STAGES: [StageDef; 4] = [
    StageDef {
        inputs: &[CONTIGS_DB, HMMS_DONE],
        outputs: &["external-genomes.txt"],
        args: &[
            Lit("--input-dir"),
            ArgPart::CategoryDir(Category::Contigs),
            Lit("-o"),
            Output(0),
        ],
        ..stage(
            "anvi_script_gen_genomes_file",
            "List the contigs databases as external genomes",
            Category::Pan,
            Scope::Project,
            "anvi-script-gen-genomes-file",
        )
    },
    StageDef {
        inputs: &[GENOMES_FILE],
        outputs: &["{project}-GENOMES.db"],
        params: &[ParamDef::unset("--gene-caller")],
        args: &[
            Lit("-e"),
            Input("genomes_file"),
            Lit("-o"),
            Output(0),
            Param("--gene-caller"),
        ],
        ..stage(
            "anvi_gen_genomes_storage",
            "Build the genomes storage",
            Category::Pan,
            Scope::Project,
            "anvi-gen-genomes-storage",
        )
    },
    StageDef {
        requires: &["diamond", "mcl"],
        default_threads: 4,
        inputs: &[InputSlot::from("storage", &["anvi_gen_genomes_storage"], "path")],
        outputs: &["{project}/{project}-PAN.db"],
        params: &[
            ParamDef::float("--minbit", 0.5),
            ParamDef::int("--mcl-inflation", 2),
            ParamDef::switch("--use-ncbi-blast", false),
            ParamDef::switch("--exclude-partial-gene-calls", false),
            ParamDef::switch("--skip-hierarchical-clustering", false),
            ParamDef::switch("--enforce-hierarchical-clustering", false),
        ],
        args: &[
            Lit("-g"),
            Input("storage"),
            Lit("--project-name"),
            Name,
            Lit("-o"),
            OutputDir(0),
            Threads("-T"),
            Param("--minbit"),
            Param("--mcl-inflation"),
            Param("--use-ncbi-blast"),
            Param("--exclude-partial-gene-calls"),
            Param("--skip-hierarchical-clustering"),
            Param("--enforce-hierarchical-clustering"),
        ],
        ..stage(
            "anvi_pan_genome",
            "Compute the pangenome",
            Category::Pan,
            Scope::Project,
            "anvi-pan-genome",
        )
    },
    StageDef {
        requires: &["average_nucleotide_identity.py"],
        default_enabled: false,
        inputs: &[
            GENOMES_FILE,
            InputSlot::from("pan_db", &["anvi_pan_genome"], "path").ordering(),
        ],
        outputs: &["ANI/ANIb_percentage_identity.txt"],
        params: &[ParamDef::text("--program", "pyANI")],
        args: &[
            Lit("-e"),
            Input("genomes_file"),
            Lit("-o"),
            OutputDir(0),
            Threads("-T"),
            Param("--program"),
        ],
        ..stage(
            "anvi_compute_genome_similarity",
            "Compute average nucleotide identity between genomes",
            Category::Pan,
            Scope::Project,
            "anvi-compute-genome-similarity",
        )
    },
];

static PANGENOMICS: WorkflowDefinition = WorkflowDefinition {
    kind: WorkflowKind::Pangenomics,
    description: "Pangenome of a set of genomes",
    stages: &PANGENOMICS_STAGES,
    categories: &[Category::Logs, Category::Pan],
    manifest: ManifestSpec {
        key: "fasta_txt",
        default_path: "fasta.txt",
        name_column: "name",
        group_column: None,
        file_columns: &["path"],
    },
    required_keys: &["project_name"],
    exclusive_stages: &[],
    exclusive_params: &[ExclusiveParams {
        stage: "anvi_pan_genome",
        flags: &["--skip-hierarchical-clustering", "--enforce-hierarchical-clustering"],
    }],
    embeds: Some(Embedding {
        kind: WorkflowKind::Contigs,
        entry: &[],
    }),
};

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflow::pattern::extract_placeholder_names;
    use std::collections::HashSet;

    #[test]
    fn test_every_kind_has_a_definition() {
        for kind in WorkflowKind::ALL {
            assert_eq!(definition(kind).kind, kind);
            assert!(!definition(kind).stages.is_empty());
        }
    }

    #[test]
    fn test_stage_names_are_unique_per_workflow() {
        for kind in WorkflowKind::ALL {
            let mut seen = HashSet::new();
            for stage in definition(kind).stages {
                assert!(seen.insert(stage.name), "duplicate stage {}", stage.name);
            }
        }
    }

    #[test]
    fn test_output_placeholders_match_scope() {
        for kind in WorkflowKind::ALL {
            for stage in definition(kind).stages {
                for output in stage.outputs {
                    for name in extract_placeholder_names(output) {
                        assert_eq!(name, stage.scope.placeholder(), "{} {}", stage.name, output);
                    }
                }
            }
        }
    }

    #[test]
    fn test_conservative_stages_default_off() {
        let contigs = definition(WorkflowKind::Contigs);
        for name in ["anvi_run_ncbi_cogs", "anvi_run_scg_taxonomy", "centrifuge"] {
            assert!(!contigs.stage(name).unwrap().default_enabled, "{}", name);
        }
        for name in ["anvi_script_reformat_fasta", "anvi_gen_contigs_database", "anvi_run_hmms"] {
            assert!(contigs.stage(name).unwrap().default_enabled, "{}", name);
        }
    }

    #[test]
    fn test_exactly_one_assembler_on_by_default() {
        let meta = definition(WorkflowKind::Metagenomics);
        let group = &meta.exclusive_stages[0];
        let enabled = group
            .stages
            .iter()
            .filter(|name| meta.stage(name).unwrap().default_enabled)
            .count();
        assert_eq!(enabled, 1);
    }
}
