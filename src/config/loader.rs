// src/config/loader.rs

//! Job-description loader.
//!
//! Loading happens in two phases:
//! - read every reachable document (following `include`) and reject include
//!   cycles;
//! - build the candidate tree from the parsed documents and validate it.
//!
//! The returned tree is unattached: paths start at the loaded job's id.

use std::collections::{BTreeMap, HashMap};
use std::fmt::Debug;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, info};

use crate::config::model::{
    EngineSettings, JobDocument, JobSection, NodeSection, TriggerSection, WorkerSection,
};
use crate::config::validate::{validate_include_graph, validate_tree};
use crate::errors::{JobTreeError, Result};
use crate::fs::{FileSystem, RealFileSystem};
use crate::tree::{ModifierSpec, Node, NodeConfig, NodeKey, PluginSpec, Tree, TriggerSpec, WorkerSpec};
use crate::types::{parse_duration, EventSet, LogicalValue, NodeKind, NodeResult};

/// Id of the top-level job when `[job].id` is absent.
pub const DEFAULT_JOB_ID: &str = "main";

/// A freshly loaded candidate tree.
#[derive(Debug)]
pub struct LoadedJob {
    pub tree: Tree,
    /// Logical name of the loaded job.
    pub name: String,
    /// `[config]` of the loaded document (defaults for nested documents).
    pub settings: EngineSettings,
    /// Every document read, the loaded one first.
    pub documents: Vec<PathBuf>,
}

/// Produces candidate trees from job documents.
pub trait JobLoader: Send + Sync + Debug {
    /// Load the job defined by `path`.
    ///
    /// `is_root_job` requires a `[job].name` and honours `[config]`.
    /// `is_snapshot` strips triggers, workers and loggers and freezes leaf
    /// values, so nothing in the result ever executes.
    fn load(&self, path: &Path, is_root_job: bool, is_snapshot: bool) -> Result<LoadedJob>;
}

/// TOML documents read through a [`FileSystem`].
#[derive(Debug, Clone)]
pub struct TomlJobLoader {
    fs: Arc<dyn FileSystem>,
}

impl Default for TomlJobLoader {
    fn default() -> Self {
        Self::new(Arc::new(RealFileSystem))
    }
}

impl TomlJobLoader {
    pub fn new(fs: Arc<dyn FileSystem>) -> Self {
        Self { fs }
    }

    fn read(&self, path: &Path) -> Result<JobDocument> {
        if !self.fs.is_file(path) {
            return Err(JobTreeError::document(format!(
                "job document {} not found",
                path.display()
            )));
        }
        let text = self
            .fs
            .read_to_string(path)
            .map_err(|e| JobTreeError::document(format!("{}: {e:#}", path.display())))?;
        toml::from_str(&text)
            .map_err(|e| JobTreeError::document(format!("{}: {e}", path.display())))
    }

    /// Phase one: parse every reachable document once.
    fn read_all(&self, root: &Path) -> Result<Documents> {
        let mut docs = Documents::default();
        let mut pending = vec![root.to_path_buf()];

        while let Some(path) = pending.pop() {
            if docs.parsed.contains_key(&path) {
                continue;
            }
            let doc = self.read(&path)?;
            let mut includes = Vec::new();
            collect_includes(&doc.node, &mut includes);
            for include in includes {
                let target = resolve_include(&path, &include);
                let target = self.fs.canonicalize(&target).map_err(|e| {
                    JobTreeError::document(format!(
                        "{}: include '{include}': {e:#}",
                        path.display()
                    ))
                })?;
                docs.edges.push((path.clone(), target.clone()));
                docs.includes
                    .insert((path.clone(), include), target.clone());
                pending.push(target);
            }
            docs.order.push(path.clone());
            docs.parsed.insert(path, doc);
        }

        validate_include_graph(&docs.edges)?;
        Ok(docs)
    }
}

impl JobLoader for TomlJobLoader {
    fn load(&self, path: &Path, is_root_job: bool, is_snapshot: bool) -> Result<LoadedJob> {
        let root = self
            .fs
            .canonicalize(path)
            .map_err(|e| JobTreeError::document(format!("{}: {e:#}", path.display())))?;
        let docs = self.read_all(&root)?;
        let root_doc = docs.get(&root)?;

        let name = match (&root_doc.job.name, is_root_job) {
            (Some(name), _) => name.clone(),
            (None, true) => {
                return Err(JobTreeError::document(format!(
                    "{}: the root job needs [job].name",
                    root.display()
                )));
            }
            (None, false) => file_stem(&root),
        };
        let settings = if is_root_job {
            EngineSettings::try_from(&root_doc.config)?
        } else {
            EngineSettings::default()
        };
        let id = root_doc
            .job
            .id
            .clone()
            .unwrap_or_else(|| DEFAULT_JOB_ID.to_string());

        let builder = Builder {
            docs: &docs,
            is_snapshot,
        };
        let tree = builder.job(&root, id, Some(name.clone()))?;
        validate_tree(&tree)?;

        info!(
            path = %root.display(),
            job = %name,
            nodes = tree.len(),
            documents = docs.order.len(),
            snapshot = is_snapshot,
            "job description loaded"
        );
        Ok(LoadedJob {
            tree,
            name,
            settings,
            documents: docs.order,
        })
    }
}

#[derive(Debug, Default)]
struct Documents {
    parsed: HashMap<PathBuf, JobDocument>,
    order: Vec<PathBuf>,
    edges: Vec<(PathBuf, PathBuf)>,
    /// (including document, include string) -> included document.
    includes: HashMap<(PathBuf, String), PathBuf>,
}

impl Documents {
    fn get(&self, path: &Path) -> Result<&JobDocument> {
        self.parsed.get(path).ok_or_else(|| {
            JobTreeError::document(format!("job document {} was not read", path.display()))
        })
    }
}

fn collect_includes(sections: &[NodeSection], out: &mut Vec<String>) {
    for section in sections {
        if let Some(include) = &section.include {
            out.push(include.clone());
        }
        collect_includes(&section.children, out);
    }
}

fn resolve_include(from: &Path, include: &str) -> PathBuf {
    match from.parent() {
        Some(dir) => dir.join(include),
        None => PathBuf::from(include),
    }
}

fn file_stem(path: &Path) -> String {
    path.file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or(DEFAULT_JOB_ID)
        .to_string()
}

/// Phase two: documents -> tree.
struct Builder<'a> {
    docs: &'a Documents,
    is_snapshot: bool,
}

impl Builder<'_> {
    fn job(&self, path: &Path, id: String, name: Option<String>) -> Result<Tree> {
        let doc = self.docs.get(path)?;
        let name = name
            .or_else(|| doc.job.name.clone())
            .unwrap_or_else(|| file_stem(path));

        let mut config = self.job_config(&doc.job, path)?;
        config.checkers = doc.checker.clone();

        let mut job = Node::new(id, NodeKind::JobList, config).with_name(name);
        if let Some(data) = job.job_data.as_mut() {
            data.source = Some(path.to_path_buf());
        }

        let mut tree = Tree::new(job);
        let root = tree.root();
        for section in &doc.node {
            self.section(&mut tree, root, path, section)?;
        }
        debug!(path = %path.display(), nodes = tree.len(), "built job from document");
        Ok(tree)
    }

    fn job_config(&self, job: &JobSection, path: &Path) -> Result<NodeConfig> {
        let ctx = || format!("{} [job]", path.display());
        let mut config = NodeConfig {
            expression: job.expression.clone(),
            ..NodeConfig::default()
        };
        if !self.is_snapshot {
            config.trigger = trigger(job.trigger.as_ref(), &ctx)?;
            config.logger = job.logger.clone();
            config.workers = workers(&job.workers);
        }
        Ok(config)
    }

    fn section(
        &self,
        tree: &mut Tree,
        parent: NodeKey,
        doc_path: &Path,
        section: &NodeSection,
    ) -> Result<NodeKey> {
        let ctx = || format!("{} node '{}'", doc_path.display(), section.id);

        if let Some(include) = &section.include {
            if section.kind != NodeKind::JobList {
                return Err(JobTreeError::document(format!(
                    "{}: include requires kind = \"job\"",
                    ctx()
                )));
            }
            let target = self
                .docs
                .includes
                .get(&(doc_path.to_path_buf(), include.clone()))
                .ok_or_else(|| JobTreeError::document(format!("{}: include '{include}' was not read", ctx())))?;
            let mut sub = self.job(target, section.id.clone(), section.name.clone())?;
            let sub_root = sub.root();
            let moved = tree.move_subtree_from(&mut sub, sub_root)?;
            let len = tree.node(parent)?.children().len();
            tree.attach(parent, len, moved)?;
            return Ok(moved);
        }

        let node = self.node(section, &ctx)?;
        let key = tree.add_child(parent, node)?;
        for child in &section.children {
            self.section(tree, key, doc_path, child)?;
        }
        Ok(key)
    }

    fn node(&self, section: &NodeSection, ctx: &dyn Fn() -> String) -> Result<Node> {
        let require = |present: bool, field: &str| {
            if present {
                Ok(())
            } else {
                Err(JobTreeError::document(format!(
                    "{}: kind '{}' requires '{field}'",
                    ctx(),
                    section.kind
                )))
            }
        };

        if !section.kind.is_branch() && !section.children.is_empty() {
            return Err(JobTreeError::document(format!(
                "{}: kind '{}' cannot have children",
                ctx(),
                section.kind
            )));
        }

        let mut kind = section.kind;
        let mut config = NodeConfig {
            expression: section.expression.clone(),
            target: section.target.clone(),
            value: section.value.map(LogicalValue::from_bool),
            checkers: section.checkers.clone(),
            ..NodeConfig::default()
        };

        match kind {
            NodeKind::SingleNode => require(section.checker.is_some() || self.is_snapshot, "checker")?,
            NodeKind::Connector => require(section.target.is_some(), "target")?,
            NodeKind::Constant => require(section.value.is_some(), "value")?,
            NodeKind::ValueModifier => require(section.modifier.is_some(), "modifier")?,
            NodeKind::JobList | NodeKind::NodeList | NodeKind::Snapshot => {}
        }

        if let Some(m) = &section.modifier {
            config.modifier = Some(ModifierSpec {
                checker: m.checker.clone(),
                op: m.op,
            });
        }

        if self.is_snapshot {
            if kind == NodeKind::SingleNode {
                kind = NodeKind::Snapshot;
            }
        } else {
            config.checker = section.checker.clone();
            config.trigger = trigger(section.trigger.as_ref(), ctx)?;
            config.logger = section.logger.clone();
            config.workers = workers(&section.workers);
        }

        let name = section.name.clone().unwrap_or_else(|| section.id.clone());
        let frozen = config.value;
        let mut node = Node::new(section.id.clone(), kind, config).with_name(name);
        if let Some(value) = frozen {
            node.record_result(NodeResult::new(value));
            node.progress = Default::default();
        }
        Ok(node)
    }
}

fn trigger(section: Option<&TriggerSection>, ctx: &dyn Fn() -> String) -> Result<Option<TriggerSpec>> {
    Ok(match section {
        None => None,
        Some(TriggerSection::Every { every }) => {
            let every = parse_duration(every)
                .map_err(|e| JobTreeError::document(format!("{}: trigger.every: {e}", ctx())))?;
            Some(TriggerSpec::Every(every))
        }
        Some(TriggerSection::On { on, source }) => {
            if on.is_empty() {
                return Err(JobTreeError::document(format!(
                    "{}: trigger.on must name at least one event",
                    ctx()
                )));
            }
            Some(TriggerSpec::On {
                events: EventSet::new(on.iter().cloned()),
                source: source.clone(),
            })
        }
    })
}

/// Group worker sections by event set, keeping document order within a set.
fn workers(sections: &[WorkerSection]) -> Vec<WorkerSpec> {
    let mut grouped: BTreeMap<EventSet, Vec<PluginSpec>> = BTreeMap::new();
    for w in sections {
        grouped
            .entry(EventSet::new(w.on.iter().cloned()))
            .or_default()
            .push(PluginSpec {
                plugin: w.plugin.clone(),
                args: w.args.clone(),
            });
    }
    grouped
        .into_iter()
        .map(|(on, plugins)| WorkerSpec { on, plugins })
        .collect()
}
