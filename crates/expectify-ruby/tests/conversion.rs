//! End-to-end conversion tests.
//!
//! These drive [`expectify_ruby::run`] the way the CLI does, with an
//! in-memory file set and, where runtime facts matter, a scripted
//! [`FactProvider`] standing in for the instrumented spec run.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use expectify_core::config::{BooleanMatcherTarget, Category, Configuration};
use expectify_core::error::ProbeExecutionError;
use expectify_core::facts::FactTable;
use expectify_core::output::AnalysisStatus;
use expectify_ruby::dynamic::{FactProvider, ProbeBatch};
use expectify_ruby::{run, ConvertedFile, RunOutcome, SourceFile};
use serde_json::json;

const SPEC: &str = "spec/a_spec.rb";

fn run_one(source: &str, config: &Configuration) -> RunOutcome {
    run(vec![SourceFile::new(SPEC, source)], config, None)
}

fn converted(outcome: &RunOutcome) -> &ConvertedFile {
    outcome.files[0]
        .result
        .as_ref()
        .expect("file should convert")
}

fn output_of(source: &str) -> String {
    converted(&run_one(source, &Configuration::default()))
        .output
        .clone()
}

/// Answers every batch with a fixed table and remembers what it was asked.
struct ScriptedProvider {
    facts: FactTable,
    calls: AtomicUsize,
    probed_files: Mutex<Vec<String>>,
}

impl ScriptedProvider {
    fn new(facts: FactTable) -> Self {
        ScriptedProvider {
            facts,
            calls: AtomicUsize::new(0),
            probed_files: Mutex::new(Vec::new()),
        }
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl FactProvider for ScriptedProvider {
    fn collect(&self, batch: &ProbeBatch) -> Result<FactTable, ProbeExecutionError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.probed_files
            .lock()
            .unwrap()
            .extend(batch.files.iter().map(|f| f.path.clone()));
        Ok(self.facts.clone())
    }
}

/// A spec run that never produces facts.
struct FailingProvider;

impl FactProvider for FailingProvider {
    fn collect(&self, _batch: &ProbeBatch) -> Result<FactTable, ProbeExecutionError> {
        Err(ProbeExecutionError::MissingFacts { exit_code: Some(1) })
    }
}

// ============================================================================
// Scenarios
// ============================================================================

mod scenarios {
    use super::*;

    #[test]
    fn should_with_matcher() {
        let outcome = run_one(
            "describe 'x' do\n  it 'works' do\n    obj.should eq(1)\n  end\nend\n",
            &Configuration::default(),
        );
        let file = converted(&outcome);
        assert_eq!(
            file.output,
            "describe 'x' do\n  it 'works' do\n    expect(obj).to eq(1)\n  end\nend\n"
        );
        assert!(file.changed);
        let summary = outcome.report.summary();
        assert_eq!(summary.len(), 1);
        assert_eq!(summary[0].original, "obj.should");
        assert_eq!(summary[0].converted, "expect(obj).to");
        assert_eq!(summary[0].count, 1);
    }

    #[test]
    fn stub_with_return_value() {
        let outcome = run_one(
            "it 'stubs' do\n  subject.stub(:foo).and_return(1)\nend\n",
            &Configuration::default(),
        );
        assert_eq!(
            converted(&outcome).output,
            "it 'stubs' do\n  allow(subject).to receive(:foo).and_return(1)\nend\n"
        );
        assert_eq!(outcome.report.records()[0].original, "obj.stub(:message)");
    }

    #[test]
    fn have_items_with_static_fallback() {
        let outcome = run_one(
            "it { expect(obj).to have(3).items }\n",
            &Configuration::default(),
        );
        assert_eq!(
            converted(&outcome).output,
            "it { expect(obj.items.size).to eq(3) }\n"
        );
        assert_eq!(
            outcome.report.records()[0].converted,
            "expect(obj.items.size).to eq(n)"
        );
    }

    #[test]
    fn unavailable_context_is_left_alone() {
        let source = "describe 'x' do\n  obj.should eq(1)\nend\n";
        let config = Configuration {
            skip_dynamic_analysis: true,
            ..Configuration::default()
        };
        let outcome = run_one(source, &config);
        let file = converted(&outcome);
        assert_eq!(file.output, source);
        assert!(!file.changed);
        assert!(outcome.report.is_empty());
    }
}

// ============================================================================
// Properties
// ============================================================================

mod properties {
    use super::*;

    const MIXED: &str = "\
describe User do
  let(:mailer) { mock('mailer') }

  it 'saves' do
    user.should be_valid
    user.stub(:name => 'x', :age => 3)
    mailer.should_receive(:deliver)
    user.should_not be_true
    expect(user).to have(2).posts
  end
end
";

    #[test]
    fn conversion_is_idempotent() {
        let first = output_of(MIXED);
        assert_ne!(first, MIXED);
        let second = run_one(&first, &Configuration::default());
        let file = converted(&second);
        assert_eq!(file.output, first);
        assert!(!file.changed);
        assert!(second.report.is_empty());
    }

    #[test]
    fn bytes_outside_rewrites_are_preserved() {
        let source = "# frozen_string_literal: true\n\nit 'x' do  # keep   this\n\tobj.should   eq( 1 )   # and this\nend\n";
        assert_eq!(
            output_of(source),
            "# frozen_string_literal: true\n\nit 'x' do  # keep   this\n\texpect(obj).to   eq( 1 )   # and this\nend\n"
        );
    }

    #[test]
    fn report_follows_path_then_position() {
        let outcome = run(
            vec![
                SourceFile::new("spec/b_spec.rb", "it { b.should eq(1) }\n"),
                SourceFile::new(
                    "spec/a_spec.rb",
                    "it { a.stub(:x) }\nit { a.should eq(2) }\n",
                ),
            ],
            &Configuration::default(),
            None,
        );
        let originals: Vec<_> = outcome
            .report
            .records()
            .iter()
            .map(|r| r.original.as_str())
            .collect();
        assert_eq!(originals, ["obj.stub(:message)", "obj.should", "obj.should"]);

        let summary = outcome.report.summary();
        assert_eq!(summary[0].original, "obj.should");
        assert_eq!(summary[0].count, 2);
        assert_eq!(summary[1].count, 1);
    }

    #[test]
    fn duplicate_inputs_are_converted_once() {
        let outcome = run(
            vec![
                SourceFile::new(SPEC, "it { a.should eq(1) }\n"),
                SourceFile::new(SPEC, "it { a.should eq(1) }\n"),
            ],
            &Configuration::default(),
            None,
        );
        assert_eq!(outcome.files.len(), 1);
        assert_eq!(outcome.report.len(), 1);
    }
}

// ============================================================================
// Construct coverage
// ============================================================================

mod constructs {
    use super::*;

    #[test]
    fn multi_pair_stub_without_facts() {
        assert_eq!(
            output_of("it 'x' do\n  obj.stub(:a => 1, :b => 2)\nend\n"),
            "it 'x' do\n  allow(obj).to receive(:a).and_return(1)\n  allow(obj).to receive(:b).and_return(2)\nend\n"
        );
    }

    #[test]
    fn any_instance_forms() {
        assert_eq!(
            output_of("it { User.any_instance.stub(:save) }\n"),
            "it { allow_any_instance_of(User).to receive(:save) }\n"
        );
        assert_eq!(
            output_of("it { Admin::User.any_instance.should_not_receive(:save) }\n"),
            "it { expect_any_instance_of(Admin::User).not_to receive(:save) }\n"
        );
    }

    #[test]
    fn operator_matchers() {
        assert_eq!(
            output_of("it { obj.should == 1 }\n"),
            "it { expect(obj).to eq(1) }\n"
        );
        assert_eq!(
            output_of("it { name.should =~ /ab/ }\n"),
            "it { expect(name).to match(/ab/) }\n"
        );
        assert_eq!(
            output_of("it { size.should < 5 }\n"),
            "it { expect(size).to be < 5 }\n"
        );
    }

    #[test]
    fn proc_subject() {
        assert_eq!(
            output_of("it { lambda { boom }.should raise_error(Oops) }\n"),
            "it { expect { boom }.to raise_error(Oops) }\n"
        );
    }

    #[test]
    fn boolean_matcher_targets() {
        assert_eq!(
            output_of("it { ready.should be_false }\n"),
            "it { expect(ready).to be_falsey }\n"
        );
        let config = Configuration {
            boolean_matcher: BooleanMatcherTarget::Exact,
            ..Configuration::default()
        };
        let outcome = run_one("it { expect(ready).to be_true }\n", &config);
        assert_eq!(
            converted(&outcome).output,
            "it { expect(ready).to be true }\n"
        );
    }

    #[test]
    fn mock_becomes_double() {
        assert_eq!(
            output_of("describe 'x' do\n  let(:m) { mock('m') }\nend\n"),
            "describe 'x' do\n  let(:m) { double('m') }\nend\n"
        );
    }

    #[test]
    fn kept_categories_are_not_converted() {
        let mut config = Configuration::default();
        config.keep.insert(Category::Should);
        let outcome = run_one(
            "it { obj.should be_true }\nit { obj.stub(:a) }\n",
            &config,
        );
        assert_eq!(
            converted(&outcome).output,
            "it { obj.should be_truthy }\nit { allow(obj).to receive(:a) }\n"
        );
    }
}

// ============================================================================
// Dynamic analysis
// ============================================================================

mod dynamic_analysis {
    use super::*;

    #[test]
    fn receive_messages_fact_collapses_hash_stub() {
        let source = "it { obj.stub(:foo => 1, :bar => 2) }\n";
        let mut facts = FactTable::new();
        facts.insert(SPEC, 5, "receive_messages_available?", json!(true));
        let provider = ScriptedProvider::new(facts);

        let outcome = run(
            vec![SourceFile::new(SPEC, source)],
            &Configuration::default(),
            Some(&provider),
        );
        assert_eq!(
            converted(&outcome).output,
            "it { allow(obj).to receive_messages(:foo => 1, :bar => 2) }\n"
        );
        assert_eq!(outcome.analysis, AnalysisStatus::Completed { facts: 1 });
        assert_eq!(*provider.probed_files.lock().unwrap(), [SPEC]);
    }

    #[test]
    fn have_facts_select_collection_query() {
        let source = "it { expect(obj).to have(3).items }\n";
        let mut facts = FactTable::new();
        facts.insert(SPEC, 12, "subject_is_owner_of_collection?", json!(false));
        facts.insert(SPEC, 12, "available_query_methods", json!(["length", "count"]));
        let provider = ScriptedProvider::new(facts);

        let outcome = run(
            vec![SourceFile::new(SPEC, source)],
            &Configuration::default(),
            Some(&provider),
        );
        assert_eq!(
            converted(&outcome).output,
            "it { expect(obj.count).to eq(3) }\n"
        );
        assert_eq!(
            outcome.report.records()[0].original,
            "expect(collection).to have(n).items"
        );
    }

    #[test]
    fn context_fact_overrides_static_inspection() {
        // Statically unavailable, but the run saw `expect` respond here.
        let source = "describe 'x' do\n  obj.should eq(1)\nend\n";
        let mut facts = FactTable::new();
        facts.insert(SPEC, 18, "expect_available?", json!(true));
        let provider = ScriptedProvider::new(facts);

        let outcome = run(
            vec![SourceFile::new(SPEC, source)],
            &Configuration::default(),
            Some(&provider),
        );
        assert_eq!(
            converted(&outcome).output,
            "describe 'x' do\n  expect(obj).to eq(1)\nend\n"
        );
    }

    #[test]
    fn failed_run_degrades_to_static_analysis() {
        let outcome = run(
            vec![SourceFile::new(SPEC, "it { obj.should eq(1) }\n")],
            &Configuration::default(),
            Some(&FailingProvider),
        );
        assert!(matches!(outcome.analysis, AnalysisStatus::Failed { .. }));
        assert_eq!(
            converted(&outcome).output,
            "it { expect(obj).to eq(1) }\n"
        );
    }

    #[test]
    fn skipping_dynamic_analysis_bypasses_provider() {
        let provider = ScriptedProvider::new(FactTable::new());
        let config = Configuration {
            skip_dynamic_analysis: true,
            ..Configuration::default()
        };
        let outcome = run(
            vec![SourceFile::new(SPEC, "it { obj.should eq(1) }\n")],
            &config,
            Some(&provider),
        );
        assert_eq!(provider.calls(), 0);
        assert_eq!(outcome.analysis, AnalysisStatus::Skipped);
        assert!(converted(&outcome).changed);
    }

    #[test]
    fn nothing_to_probe_skips_the_run() {
        let provider = ScriptedProvider::new(FactTable::new());
        let outcome = run(
            vec![SourceFile::new(SPEC, "it { expect(obj).to eq(1) }\n")],
            &Configuration::default(),
            Some(&provider),
        );
        assert_eq!(provider.calls(), 0);
        assert_eq!(outcome.analysis, AnalysisStatus::Skipped);
    }
}
