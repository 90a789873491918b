//! End-to-end conversion: parse, graph, classify, resolve, render, write.

use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};
use tracing::{debug, info};

use crate::classify::pipeline::{Classification, ClassifierPipeline};
use crate::classify::rules::FrameworkSettings;
use crate::classify::target::TargetFile;
use crate::config::ConvertConfig;
use crate::diagnostics::{DiagnosticsReport, FileDigest};
use crate::emit::assets::collect_assets;
use crate::emit::scaffold::{scaffold_files, ScaffoldOptions};
use crate::emit::writer::{write_project, PlannedFile};
use crate::emit::render_module;
use crate::errors::{OutgrowError, OutgrowResult};
use crate::graph::ReferenceGraph;
use crate::plugin::{PluginRegistry, PluginRegistryBuilder};
use crate::program::ProgramModel;
use crate::resolve::{detect_cycles, Resolver};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GeneratedFile {
    /// Path relative to the output root.
    pub path: PathBuf,
    /// Module the file renders; `None` for scaffold files.
    pub target: Option<TargetFile>,
    pub contents: String,
}

#[derive(Clone, Debug)]
pub struct ConversionOutput {
    /// Generated files sorted by path.
    pub files: Vec<GeneratedFile>,
    pub report: DiagnosticsReport,
    pub framework: FrameworkSettings,
    pub app_instance: Option<String>,
}

impl ConversionOutput {
    pub fn file(&self, path: impl AsRef<Path>) -> Option<&GeneratedFile> {
        self.files.iter().find(|f| f.path == path.as_ref())
    }

    pub fn target(&self, target: TargetFile) -> Option<&GeneratedFile> {
        self.files.iter().find(|f| f.target == Some(target))
    }
}

fn digest(file: &GeneratedFile) -> FileDigest {
    FileDigest {
        path: file.path.to_string_lossy().replace('\\', "/"),
        sha256: format!("{:x}", Sha256::digest(file.contents.as_bytes())),
        bytes: file.contents.len(),
    }
}

pub struct Converter {
    config: ConvertConfig,
    registry: PluginRegistry,
}

impl Converter {
    /// Converter with plugins discovered from `config`.
    pub fn new(config: ConvertConfig) -> OutgrowResult<Self> {
        config.validate()?;
        let registry = PluginRegistryBuilder::from_config(&config)?.build();
        Ok(Converter { config, registry })
    }

    pub fn with_registry(config: ConvertConfig, registry: PluginRegistry) -> OutgrowResult<Self> {
        config.validate()?;
        Ok(Converter { config, registry })
    }

    pub fn config(&self) -> &ConvertConfig {
        &self.config
    }

    pub fn registry(&self) -> &PluginRegistry {
        &self.registry
    }

    /// Convert source text into the files of a project. Nothing is written.
    pub fn convert_source(&self, source: &str) -> OutgrowResult<ConversionOutput> {
        let layout = self.config.layout();
        let program = ProgramModel::parse(source)?;
        let graph = ReferenceGraph::build(&program);

        let Classification {
            claims,
            app_instance,
            framework,
            templates,
            mut report,
        } = ClassifierPipeline::new(&program, &graph, &self.config, &self.registry).run()?;

        let resolved = Resolver::new(&program, &graph, &claims, &self.config).resolve_all(&mut report);
        report.cycles = detect_cycles(&resolved, &layout);

        let mut files: Vec<GeneratedFile> = resolved
            .iter()
            .filter(|file| !file.is_empty())
            .map(|file| GeneratedFile {
                path: layout.rel_path(file.target),
                target: Some(file.target),
                contents: render_module(file, &layout),
            })
            .collect();

        let written = |target: TargetFile| files.iter().any(|f| f.target == Some(target));
        let options = ScaffoldOptions {
            admin_url: framework.admin_url.clone(),
            app_has_urls: written(TargetFile::Urls),
            has_template_tags: written(TargetFile::TemplateTags),
        };
        files.extend(
            scaffold_files(&layout, &options)
                .into_iter()
                .map(|(path, contents)| GeneratedFile {
                    path,
                    target: None,
                    contents,
                }),
        );
        let template_dir = layout.app_dir().join("templates");
        files.extend(templates.into_iter().map(|template| GeneratedFile {
            path: template_dir.join(&template.name),
            target: None,
            contents: template.contents,
        }));
        files.sort_by(|a, b| a.path.cmp(&b.path));
        report.files = files.iter().map(digest).collect();

        info!(
            files = files.len(),
            swept = report.swept.len(),
            cycles = report.cycles.len(),
            unresolved = report.unresolved.len(),
            "conversion finished"
        );
        Ok(ConversionOutput {
            files,
            report,
            framework,
            app_instance,
        })
    }

    /// Convert `input` and write the project under `root`, together with
    /// the assets found next to the script. Generated files win over assets
    /// copied to the same path.
    ///
    /// Conversion runs to completion before anything touches `root`.
    pub fn convert_file(&self, input: &Path, root: &Path) -> OutgrowResult<ConversionOutput> {
        let source = std::fs::read_to_string(input).map_err(|err| {
            OutgrowError::Io(std::io::Error::new(
                err.kind(),
                format!("reading {}: {err}", input.display()),
            ))
        })?;
        let output = self.convert_source(&source)?;

        let assets = collect_assets(input, &self.config.layout(), &output.framework)?;
        let mut planned: Vec<PlannedFile> = output
            .files
            .iter()
            .map(|f| PlannedFile::text(&f.path, f.contents.as_str()))
            .collect();
        for asset in assets {
            if output.file(&asset.dest).is_some() {
                debug!(dest = %asset.dest.display(), "asset replaced by generated file");
                continue;
            }
            planned.push(PlannedFile::copy(asset.dest, asset.source));
        }

        write_project(root, &planned, self.config.overwrite)?;
        Ok(output)
    }
}
