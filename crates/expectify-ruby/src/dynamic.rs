//! Runtime facts from an instrumented spec run.
//!
//! Some decisions cannot be made from the source alone: whether `expect` is
//! callable where a `should` sits inside a shared helper, whether a subject
//! responds to `receive_messages`, which of `size`/`count`/`length` a
//! collection supports. Constructs register [`ProbeRequest`]s for those
//! questions; this module wraps each probed node so that running the suite
//! records the answers, runs the suite once inside a sandbox copy of the
//! project, and reads the resulting [`FactTable`].
//!
//! A probed node `node` is rewritten (in the sandbox copy only) to
//!
//! ```text
//! ::ExpectifyProbe.record((node), self, 'spec/a_spec.rb', 120, {'key' => [:context, 'code']})
//! ```
//!
//! `record` evaluates each code snippet against the call-site `self`
//! (`:context`) or the node's value (`:value`), keeps the first observation
//! per `(file, offset, key)`, and returns the value unchanged.

use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use expectify_core::config::Configuration;
use expectify_core::error::ProbeExecutionError;
use expectify_core::facts::FactTable;
use expectify_core::patch::Edit;
use expectify_core::rewrite::Rewriter;
use expectify_core::sandbox::{SandboxConfig, SandboxHandle};

use crate::call::ruby_single_quoted;
use crate::tree::{NodeId, SyntaxTree};

/// File name of the helper inside the sandbox metadata directory.
const HELPER_FILE: &str = "expectify_probe.rb";

/// Directory (inside the metadata directory) the helper writes facts to.
const FACTS_DIR: &str = "facts";

/// Ruby helper loaded into every process of the spec run.
pub const RUBY_HELPER: &str = r##"require 'json'

module ExpectifyProbe
  @facts = {}
  @mutex = Mutex.new

  class << self
    def record(value, context, file, offset, requests)
      requests.each do |key, (target, code)|
        address = [file, offset, key]
        next if @mutex.synchronize { @facts.key?(address) }
        receiver = target == :value ? value : context
        entry =
          begin
            { 'value' => normalize(receiver.instance_eval(code)) }
          rescue Exception => e
            { 'error' => "#{e.class}: #{e.message}" }
          end
        @mutex.synchronize { @facts[address] ||= entry }
      end
      value
    end

    def normalize(result)
      case result
      when Symbol then result.to_s
      when Array then result.map { |item| normalize(item) }
      when true, false, nil, Numeric, String then result
      else result.inspect
      end
    end

    def dump
      dir = ENV['EXPECTIFY_FACTS_DIR']
      return unless dir
      facts = @mutex.synchronize do
        @facts.map do |(file, offset, key), entry|
          { 'file' => file, 'offset' => offset, 'key' => key }.merge(entry)
        end
      end
      path = File.join(dir, "facts-#{Process.pid}.json")
      File.write(path, JSON.generate('version' => 1, 'facts' => facts))
    end
  end
end

at_exit { ExpectifyProbe.dump }
"##;

// ============================================================================
// Probe Requests
// ============================================================================

/// What a probe's code is evaluated against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProbeTarget {
    /// The `self` of the code surrounding the node.
    Context,
    /// The value the node evaluates to.
    Value,
}

impl ProbeTarget {
    fn ruby_symbol(self) -> &'static str {
        match self {
            ProbeTarget::Context => ":context",
            ProbeTarget::Value => ":value",
        }
    }
}

/// A runtime question about one node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeRequest {
    pub node: NodeId,
    pub key: &'static str,
    /// Ruby code evaluated against the target.
    pub expression: String,
    pub target: ProbeTarget,
}

/// Collects probe requests for one file, one per `(node, key)`.
#[derive(Debug, Default)]
pub struct ProbeSink {
    requests: Vec<ProbeRequest>,
    seen: HashSet<(NodeId, &'static str)>,
}

impl ProbeSink {
    pub fn new() -> Self {
        ProbeSink::default()
    }

    /// Ask a question about the call-site context of `node`.
    pub fn context(&mut self, node: NodeId, key: &'static str, expression: impl Into<String>) {
        self.push(ProbeRequest {
            node,
            key,
            expression: expression.into(),
            target: ProbeTarget::Context,
        });
    }

    /// Ask a question about the value of `node`.
    pub fn value(&mut self, node: NodeId, key: &'static str, expression: impl Into<String>) {
        self.push(ProbeRequest {
            node,
            key,
            expression: expression.into(),
            target: ProbeTarget::Value,
        });
    }

    /// Add a request; duplicates of an existing `(node, key)` are dropped.
    pub fn push(&mut self, request: ProbeRequest) {
        if self.seen.insert((request.node, request.key)) {
            self.requests.push(request);
        }
    }

    pub fn requests(&self) -> &[ProbeRequest] {
        &self.requests
    }

    pub fn into_requests(self) -> Vec<ProbeRequest> {
        self.requests
    }

    pub fn len(&self) -> usize {
        self.requests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.requests.is_empty()
    }
}

// ============================================================================
// Probe Batch
// ============================================================================

/// Serializable form of a request, addressed by start offset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProbeSpec {
    pub offset: usize,
    pub key: String,
    pub expression: String,
    pub target: ProbeTarget,
}

/// An instrumented copy of one spec file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstrumentedFile {
    /// Path relative to the project root.
    pub path: String,
    /// Instrumented source.
    pub source: String,
    pub probes: Vec<ProbeSpec>,
}

/// Everything a [`FactProvider`] needs for one run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProbeBatch {
    pub files: Vec<InstrumentedFile>,
}

impl ProbeBatch {
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Total number of probes across files.
    pub fn probe_count(&self) -> usize {
        self.files.iter().map(|f| f.probes.len()).sum()
    }
}

/// Instrument `tree` (the file at `path`) for `requests`.
///
/// Returns `None` when no node could be probed.
pub fn instrument(
    tree: &SyntaxTree,
    path: &str,
    requests: &[ProbeRequest],
) -> Option<InstrumentedFile> {
    let mut by_node: BTreeMap<NodeId, Vec<&ProbeRequest>> = BTreeMap::new();
    for request in requests {
        by_node.entry(request.node).or_default().push(request);
    }

    let mut rewriter = Rewriter::new(tree.source());
    let mut probes = Vec::new();
    for (node, group) in by_node {
        if tree.contains_kind(node, "heredoc_beginning") {
            debug!(file = path, offset = tree.span(node).start, "not probing node with heredoc");
            continue;
        }
        let span = tree.span(node);
        let entries: Vec<String> = group
            .iter()
            .map(|r| {
                format!(
                    "{} => [{}, {}]",
                    ruby_single_quoted(r.key),
                    r.target.ruby_symbol(),
                    ruby_single_quoted(&r.expression)
                )
            })
            .collect();
        let suffix = format!(
            "), self, {}, {}, {{{}}})",
            ruby_single_quoted(path),
            span.start,
            entries.join(", ")
        );
        let wrapped = rewriter
            .add(Edit::insert_before(span.start, "::ExpectifyProbe.record(("))
            .and_then(|()| rewriter.add(Edit::insert_after(span.end, suffix)));
        if let Err(e) = wrapped {
            warn!(file = path, error = %e, "skipping probe");
            continue;
        }
        probes.extend(group.iter().map(|r| ProbeSpec {
            offset: span.start,
            key: r.key.to_string(),
            expression: r.expression.clone(),
            target: r.target,
        }));
    }

    if probes.is_empty() {
        return None;
    }
    debug!(file = path, probes = probes.len(), "instrumented");
    match rewriter.apply() {
        Ok(source) => Some(InstrumentedFile {
            path: path.to_string(),
            source,
            probes,
        }),
        Err(e) => {
            warn!(file = path, error = %e, "instrumentation failed");
            None
        }
    }
}

// ============================================================================
// Fact Providers
// ============================================================================

/// Source of runtime facts for a probe batch.
pub trait FactProvider: Sync {
    fn collect(&self, batch: &ProbeBatch) -> Result<FactTable, ProbeExecutionError>;
}

/// Runs the spec command in a sandbox copy of the project.
#[derive(Debug, Clone)]
pub struct DynamicAnalyzer {
    project_root: PathBuf,
    command: Vec<String>,
    sandbox: SandboxConfig,
}

impl DynamicAnalyzer {
    pub fn new(project_root: impl Into<PathBuf>, config: &Configuration) -> Self {
        let sandbox = SandboxConfig {
            keep_sandbox: config.keep_sandbox,
            ..SandboxConfig::default()
        }
        .with_timeout(config.analysis_timeout);
        DynamicAnalyzer {
            project_root: project_root.into(),
            command: config
                .spec_command()
                .split_whitespace()
                .map(str::to_string)
                .collect(),
            sandbox,
        }
    }

    pub fn project_root(&self) -> &Path {
        &self.project_root
    }

    /// The command line run for `batch`: the spec command plus each file.
    pub fn command_for(&self, batch: &ProbeBatch) -> Vec<String> {
        let mut command = self.command.clone();
        command.extend(batch.files.iter().map(|f| f.path.clone()));
        command
    }

    fn run_in(
        &self,
        sandbox: &mut SandboxHandle,
        batch: &ProbeBatch,
    ) -> Result<FactTable, ProbeExecutionError> {
        for file in &batch.files {
            sandbox.write_file(Path::new(&file.path), file.source.as_bytes())?;
        }

        let helper = sandbox.meta_dir().join(HELPER_FILE);
        fs::write(&helper, RUBY_HELPER)?;
        let facts_dir = sandbox.meta_dir().join(FACTS_DIR);
        fs::create_dir_all(&facts_dir)?;

        let require = format!("-r{}", helper.display());
        let rubyopt = match std::env::var("RUBYOPT") {
            Ok(existing) if !existing.trim().is_empty() => format!("{existing} {require}"),
            _ => require,
        };
        sandbox.set_env("RUBYOPT", rubyopt);
        sandbox.set_env("EXPECTIFY_FACTS_DIR", facts_dir.to_string_lossy());

        let command = self.command_for(batch);
        info!(command = %command.join(" "), probes = batch.probe_count(), "running dynamic analysis");
        let result = sandbox
            .run_command(&command)
            .map_err(|source| ProbeExecutionError::Spawn {
                command: command.join(" "),
                source,
            })?;

        if result.timed_out {
            return Err(ProbeExecutionError::Timeout {
                timeout: self.sandbox.timeout,
            });
        }
        if !result.success {
            warn!(
                exit_code = ?result.exit_code,
                "spec run exited unsuccessfully; using the facts it recorded"
            );
        }

        read_fact_files(&facts_dir)?.ok_or(ProbeExecutionError::MissingFacts {
            exit_code: result.exit_code,
        })
    }
}

impl FactProvider for DynamicAnalyzer {
    fn collect(&self, batch: &ProbeBatch) -> Result<FactTable, ProbeExecutionError> {
        let mut sandbox = SandboxHandle::create(&self.project_root, self.sandbox.clone())?;
        let copied = sandbox.copied_files().len();
        let result = self.run_in(&mut sandbox, batch);
        if let Some(kept) = sandbox.dispose() {
            info!(path = %kept.display(), files = copied, "sandbox kept");
        }
        result
    }
}

/// Merge every `*.json` file in `dir`, in name order. `None` if there are
/// no fact files.
fn read_fact_files(dir: &Path) -> Result<Option<FactTable>, ProbeExecutionError> {
    let mut paths: Vec<PathBuf> = fs::read_dir(dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| p.extension().is_some_and(|ext| ext == "json"))
        .collect();
    if paths.is_empty() {
        return Ok(None);
    }
    paths.sort();

    let mut table = FactTable::new();
    for path in paths {
        let json = fs::read_to_string(&path)?;
        let facts = FactTable::from_json(&json).map_err(|e| ProbeExecutionError::InvalidFacts {
            path: path.clone(),
            message: e.to_string(),
        })?;
        table.merge(facts);
    }
    Ok(Some(table))
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn node(tree: &SyntaxTree, kind: &str, text: &str) -> NodeId {
        tree.preorder()
            .find(|&id| tree.kind(id) == kind && tree.text(id) == text)
            .unwrap_or_else(|| panic!("no {kind} `{text}`"))
    }

    mod sink_tests {
        use super::*;

        #[test]
        fn duplicates_are_dropped() {
            let tree = SyntaxTree::parse("obj.should be_nil\n").unwrap();
            let id = node(&tree, "call", "obj.should be_nil");
            let mut sink = ProbeSink::new();
            sink.context(id, "expect_available?", "respond_to?(:expect)");
            sink.context(id, "expect_available?", "respond_to?(:expect)");
            sink.value(id, "other?", "true");
            assert_eq!(sink.len(), 2);
            assert_eq!(sink.requests()[1].target, ProbeTarget::Value);
        }
    }

    mod instrument_tests {
        use super::*;

        #[test]
        fn wraps_probed_node() {
            let source = "it { obj.should be_nil }\n";
            let tree = SyntaxTree::parse(source).unwrap();
            let id = node(&tree, "call", "obj.should be_nil");
            let mut sink = ProbeSink::new();
            sink.context(id, "expect_available?", "respond_to?(:expect)");
            let file = instrument(&tree, "spec/a_spec.rb", sink.requests()).unwrap();
            assert_eq!(
                file.source,
                "it { ::ExpectifyProbe.record((obj.should be_nil), self, 'spec/a_spec.rb', 5, \
                 {'expect_available?' => [:context, 'respond_to?(:expect)']}) }\n"
            );
            assert_eq!(file.probes.len(), 1);
            assert_eq!(file.probes[0].offset, 5);
        }

        #[test]
        fn groups_requests_per_node() {
            let tree = SyntaxTree::parse("x.stub(:a => 1)\n").unwrap();
            let id = node(&tree, "call", "x.stub(:a => 1)");
            let mut sink = ProbeSink::new();
            sink.context(id, "a?", "1");
            sink.context(id, "b?", "2");
            let file = instrument(&tree, "a.rb", sink.requests()).unwrap();
            assert_eq!(file.source.matches("::ExpectifyProbe.record").count(), 1);
            assert!(file.source.contains("{'a?' => [:context, '1'], 'b?' => [:context, '2']}"));
        }

        #[test]
        fn nested_probes_close_inside_out() {
            let source = "obj.should have(2).items\n";
            let tree = SyntaxTree::parse(source).unwrap();
            let outer = node(&tree, "call", "obj.should have(2).items");
            let inner = node(&tree, "identifier", "obj");
            let mut sink = ProbeSink::new();
            sink.context(outer, "outer?", "1");
            sink.value(inner, "inner?", "2");
            let file = instrument(&tree, "a.rb", sink.requests()).unwrap();
            assert!(file.source.starts_with(
                "::ExpectifyProbe.record((::ExpectifyProbe.record((obj), self, 'a.rb', 0, {'inner?'"
            ));
            assert!(file.source.ends_with("{'outer?' => [:context, '1']})\n"));
        }

        #[test]
        fn heredoc_nodes_are_skipped() {
            let source = "obj.should eq(<<~TEXT)\n  hi\nTEXT\n";
            let tree = SyntaxTree::parse(source).unwrap();
            let id = tree
                .preorder()
                .find(|&id| crate::call::method_name(&tree, id) == Some("should"))
                .unwrap();
            let mut sink = ProbeSink::new();
            sink.context(id, "expect_available?", "respond_to?(:expect)");
            assert!(instrument(&tree, "a.rb", sink.requests()).is_none());
        }

        #[test]
        fn quotes_are_escaped() {
            let tree = SyntaxTree::parse("obj.stub(:a)\n").unwrap();
            let id = node(&tree, "call", "obj.stub(:a)");
            let mut sink = ProbeSink::new();
            sink.context(id, "k", "x == 'y'");
            let file = instrument(&tree, "it's.rb", sink.requests()).unwrap();
            assert!(file.source.contains("'it\\'s.rb'"));
            assert!(file.source.contains("'x == \\'y\\''"));
        }
    }

    mod analyzer_tests {
        use super::*;
        use tempfile::TempDir;

        fn batch(path: &str) -> ProbeBatch {
            ProbeBatch {
                files: vec![InstrumentedFile {
                    path: path.to_string(),
                    source: "# instrumented\n".to_string(),
                    probes: vec![],
                }],
            }
        }

        #[test]
        fn command_appends_files() {
            let config = Configuration {
                rspec_command: Some("bin/rspec --fail-fast".to_string()),
                ..Configuration::default()
            };
            let analyzer = DynamicAnalyzer::new("/project", &config);
            assert_eq!(
                analyzer.command_for(&batch("spec/a_spec.rb")),
                ["bin/rspec", "--fail-fast", "spec/a_spec.rb"]
            );
        }

        #[test]
        fn spawn_failure_is_reported() {
            let dir = TempDir::new().unwrap();
            let config = Configuration {
                rspec_command: Some("expectify-no-such-command-xyz".to_string()),
                ..Configuration::default()
            };
            let analyzer = DynamicAnalyzer::new(dir.path(), &config);
            let err = analyzer.collect(&batch("spec/a_spec.rb")).unwrap_err();
            assert!(matches!(err, ProbeExecutionError::Spawn { .. }));
        }

        #[cfg(unix)]
        #[test]
        fn run_without_fact_files_is_missing_facts() {
            let dir = TempDir::new().unwrap();
            let config = Configuration {
                rspec_command: Some("true".to_string()),
                ..Configuration::default()
            };
            let analyzer = DynamicAnalyzer::new(dir.path(), &config);
            let err = analyzer.collect(&batch("spec/a_spec.rb")).unwrap_err();
            assert!(matches!(err, ProbeExecutionError::MissingFacts { exit_code: Some(0) }));
        }

        #[test]
        fn ruby_helper_records_values_and_errors() {
            if which::which("ruby").is_err() {
                return;
            }
            let source = "items = [1, 2, 3]\nitems\n";
            let dir = TempDir::new().unwrap();
            fs::write(dir.path().join("sample.rb"), source).unwrap();

            let tree = SyntaxTree::parse(source).unwrap();
            let items = tree
                .preorder()
                .find(|&id| tree.kind(id) == "identifier" && tree.span(id).start == 18)
                .unwrap();
            let mut sink = ProbeSink::new();
            sink.value(items, "size", "size");
            sink.value(
                items,
                "queries",
                "[:size, :count, :nope].select { |m| respond_to?(m) }",
            );
            sink.value(items, "boom", "raise ArgumentError, 'boom'");
            sink.context(items, "self", "to_s");
            let batch = ProbeBatch {
                files: vec![instrument(&tree, "sample.rb", sink.requests()).unwrap()],
            };

            let config = Configuration {
                rspec_command: Some("ruby".to_string()),
                ..Configuration::default()
            };
            let table = DynamicAnalyzer::new(dir.path(), &config)
                .collect(&batch)
                .unwrap();

            let facts = table.for_file("sample.rb").unwrap();
            assert_eq!(facts.len(), 4);
            assert_eq!(facts.get(18, "size"), Some(&serde_json::json!(3)));
            assert_eq!(
                facts.strings(18, "queries"),
                Some(vec!["size".to_string(), "count".to_string()])
            );
            assert_eq!(facts.get(18, "self"), Some(&serde_json::json!("main")));
            assert_eq!(facts.get(18, "boom"), None);
            assert_eq!(facts.raised(18, "boom"), Some("ArgumentError: boom"));
            assert_eq!(
                fs::read_to_string(dir.path().join("sample.rb")).unwrap(),
                source
            );
        }

        #[test]
        fn fact_files_merge_in_name_order() {
            let dir = TempDir::new().unwrap();
            fs::write(
                dir.path().join("facts-2.json"),
                r#"{"version":1,"facts":[{"file":"a.rb","offset":1,"key":"k","value":false}]}"#,
            )
            .unwrap();
            fs::write(
                dir.path().join("facts-1.json"),
                r#"{"version":1,"facts":[{"file":"a.rb","offset":1,"key":"k","value":true}]}"#,
            )
            .unwrap();
            let table = read_fact_files(dir.path()).unwrap().unwrap();
            assert_eq!(table.for_file("a.rb").unwrap().bool(1, "k"), Some(true));
        }

        #[test]
        fn invalid_fact_file_is_reported() {
            let dir = TempDir::new().unwrap();
            fs::write(dir.path().join("facts-1.json"), "{not json").unwrap();
            let err = read_fact_files(dir.path()).unwrap_err();
            assert!(matches!(err, ProbeExecutionError::InvalidFacts { .. }));
        }

        #[test]
        fn empty_dir_has_no_facts() {
            let dir = TempDir::new().unwrap();
            assert!(read_fact_files(dir.path()).unwrap().is_none());
        }
    }
}
