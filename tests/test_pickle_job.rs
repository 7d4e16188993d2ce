use anyhow::anyhow;
use std::sync::Arc;

use clusterflow::{
    domain::function_registry::arg,
    domain::pickle_job::deferred_value::DeferredValue,
    domain::pickle_job::organizer::JobOrganizer,
    domain::resources::ResourceRequest,
    domain::stage::compiler::parameter_file,
    domain::stage::executor::{ExecutionOptions, execute_stage},
    domain::transcended_file::TransferOptions,
    error::{Error, SignatureError},
    loader::parser::{read_artifact, write_binary_file},
    CallContext, FunctionId, FunctionRegistry, FunctionSignature, JobJar, Kwargs, Value,
};
use tempfile::TempDir;

fn square(_ctx: &CallContext<'_>, kwargs: Kwargs) -> anyhow::Result<Value> {
    let x = arg(&kwargs, "x")?.as_int().ok_or_else(|| anyhow!("x is not an integer"))?;
    Ok(Value::Int(x * x))
}

fn divide(_ctx: &CallContext<'_>, kwargs: Kwargs) -> anyhow::Result<Value> {
    let a = arg(&kwargs, "a")?.as_int().ok_or_else(|| anyhow!("a is not an integer"))?;
    let b = arg(&kwargs, "b")?.as_int().ok_or_else(|| anyhow!("b is not an integer"))?;
    Ok(Value::Tuple(vec![Value::Int(a / b), Value::Int(a % b)]))
}

fn combine(_ctx: &CallContext<'_>, kwargs: Kwargs) -> anyhow::Result<Value> {
    let values = arg(&kwargs, "values")?.as_slice().ok_or_else(|| anyhow!("values is not a sequence"))?;
    let total: i64 = values.iter().filter_map(Value::as_int).sum();
    Ok(Value::keyed([("label", arg(&kwargs, "label")?.clone()), ("total", Value::Int(total))]))
}

fn echo(_ctx: &CallContext<'_>, kwargs: Kwargs) -> anyhow::Result<Value> {
    Ok(arg(&kwargs, "value")?.clone())
}

fn unannotated(_ctx: &CallContext<'_>, _kwargs: Kwargs) -> anyhow::Result<Value> {
    Ok(Value::Null)
}

fn id(name: &str) -> FunctionId {
    FunctionId::new("tests::pickle_job", name)
}

fn registry() -> Arc<FunctionRegistry> {
    let mut registry = FunctionRegistry::with_builtins();
    registry
        .register(id("square"), FunctionSignature::new(["x"], Some("int")), square)
        .register(id("divide"), FunctionSignature::new(["a", "b"], Some("Tuple[int, int]")), divide)
        .register(id("combine"), FunctionSignature::new(["values", "label"], Some("Dict[str, Any]")), combine)
        .register(id("echo"), FunctionSignature::new(["value"], Some("Tuple[int, int]")), echo)
        .register(id("unannotated"), FunctionSignature::new(["x"], None), unannotated);
    Arc::new(registry)
}

fn kwargs<const N: usize>(entries: [(&str, Value); N]) -> Kwargs {
    entries.into_iter().map(|(name, value)| (name.to_string(), value)).collect()
}

struct Fixture {
    jar_dir: TempDir,
    scratch: TempDir,
    registry: Arc<FunctionRegistry>,
}

impl Fixture {
    fn new() -> Self {
        Fixture { jar_dir: TempDir::new().unwrap(), scratch: TempDir::new().unwrap(), registry: registry() }
    }

    fn transfer(&self) -> TransferOptions {
        TransferOptions::with_scratch_root(self.scratch.path())
    }

    fn jar(&self) -> JobJar {
        JobJar::new(JobOrganizer::new("jar", self.jar_dir.path()), Arc::clone(&self.registry)).with_transfer(self.transfer())
    }
}

#[test]
fn test_scalar_job_has_no_dependencies() {
    let fixture = Fixture::new();
    let mut jar = fixture.jar();

    let job = jar.create_job("square", id("square"), kwargs([("x", Value::Int(4))]), ResourceRequest::default()).unwrap();
    jar.add(job).unwrap();

    let job = jar.job(job).unwrap();
    assert_eq!(job.name().as_str(), "square_0");
    assert!(job.dependencies().is_empty());
    assert!(job.input_files().is_empty());
    assert!(job.index_tuple().is_empty());
    assert!(job.call_file().exists());
    assert!(job.call_kwargs_file().exists());

    let arguments = job.stage_arguments();
    assert!(!arguments.contains_key("stage_input_files"));
    assert!(!arguments.contains_key("index_tuple"));

    let entry = jar.graph().get("square_0").unwrap();
    assert!(entry.predecessors.is_empty());
    assert_eq!(entry.stage.log_target(), Some(fixture.jar_dir.path().join("logging").join("square_0.log").as_path()));

    let stored: Kwargs = read_artifact(job.call_kwargs_file()).unwrap();
    assert_eq!(stored, kwargs([("x", Value::Int(4))]));
}

#[test]
fn test_signature_is_checked() {
    let fixture = Fixture::new();
    let mut jar = fixture.jar();

    let result = jar.create_job("square", id("square"), kwargs([("y", Value::Int(1))]), ResourceRequest::default());
    match result {
        Err(Error::SignatureMismatch(SignatureError::KeywordMismatch { missing, excess, .. })) => {
            assert_eq!(missing, vec!["x".to_string()]);
            assert_eq!(excess, vec!["y".to_string()]);
        }
        other => panic!("unexpected result {other:?}"),
    }

    let result = jar.create_job("plain", id("unannotated"), kwargs([("x", Value::Int(1))]), ResourceRequest::default());
    assert!(matches!(result, Err(Error::SignatureMismatch(SignatureError::MissingReturnAnnotation(_)))));

    let result = jar.create_job("missing", id("missing"), Kwargs::new(), ResourceRequest::default());
    assert!(matches!(result, Err(Error::UnknownFunction(_))));
    assert!(jar.is_empty());
}

#[test]
fn test_index_is_checked_against_tuple_arity() {
    let fixture = Fixture::new();
    let mut jar = fixture.jar();

    let divide = jar.create_job("divide", id("divide"), kwargs([("a", Value::Int(7)), ("b", Value::Int(2))]), ResourceRequest::default()).unwrap();
    let divide = jar.job(divide).unwrap();

    assert!(divide.get(0).is_ok());
    assert!(divide.get(1).is_ok());
    assert!(matches!(divide.get(2), Err(Error::IndexRange { index: 2, arity: 2 })));
    assert!(!divide.out_file().exists());

    let square = jar.create_job("square", id("square"), kwargs([("x", Value::Int(4))]), ResourceRequest::default()).unwrap();
    let square = jar.job(square).unwrap();
    assert!(square.get(0).is_ok());
    assert!(matches!(square.get(1), Err(Error::IndexRange { index: 1, .. })));
}

#[test]
fn test_result_is_busy_until_output_exists() {
    let fixture = Fixture::new();
    let mut jar = fixture.jar();

    let job = jar.create_job("square", id("square"), kwargs([("x", Value::Int(4))]), ResourceRequest::default()).unwrap();
    let job = jar.job(job).unwrap();

    let busy = job.result().unwrap_err();
    assert!(busy.is_busy());
    assert!(job.check_done().is_err());

    write_binary_file(job.out_file(), &Value::Int(16)).unwrap();

    job.check_done().unwrap();
    assert_eq!(job.result().unwrap(), Value::Int(16));
}

#[test]
fn test_deferred_values_become_stage_inputs() {
    let fixture = Fixture::new();
    let mut jar = fixture.jar();

    let divide = jar.create_job("divide", id("divide"), kwargs([("a", Value::Int(17)), ("b", Value::Int(5))]), ResourceRequest::default()).unwrap();
    let remainder = jar.job(divide).unwrap().get(1).unwrap();
    let out_file = jar.job(divide).unwrap().out_file().to_string_lossy().into_owned();

    let square = jar.create_job("square", id("square"), kwargs([("x", remainder.into())]), ResourceRequest::default()).unwrap();
    let square = jar.job(square).unwrap();

    assert_eq!(square.dependencies(), &[divide]);
    assert_eq!(square.input_files().len(), 1);
    let (token, file) = square.input_files().iter().next().unwrap();
    assert_eq!(file, &Value::input_file(out_file));
    assert_eq!(square.index_tuple()[token], Value::Int(1));

    let stored: Kwargs = read_artifact(square.call_kwargs_file()).unwrap();
    match &stored["x"] {
        Value::Deferred(deferred) => assert_eq!(deferred.token().unwrap(), token),
        other => panic!("unexpected stored argument {other:?}"),
    }
}

#[test]
fn test_dependencies_have_to_be_added_first() {
    let fixture = Fixture::new();
    let mut jar = fixture.jar();

    let first = jar.create_job("square", id("square"), kwargs([("x", Value::Int(2))]), ResourceRequest::default()).unwrap();
    let output = jar.job(first).unwrap().output().unwrap();
    let second = jar.create_job("square", id("square"), kwargs([("x", output.into())]), ResourceRequest::default()).unwrap();

    assert!(matches!(jar.add(second), Err(Error::JobNotStaged(name)) if name == "square_0"));

    jar.add(first).unwrap();
    jar.add(second).unwrap();
    let names: Vec<&str> = jar.graph().get("square_1").unwrap().predecessors.names().into_iter().map(|name| name.as_str()).collect();
    assert_eq!(names, vec!["square_0"]);
}

#[test]
fn test_deferred_value_without_job_is_rejected() {
    let fixture = Fixture::new();
    let mut jar = fixture.jar();

    let stray: DeferredValue = serde_json::from_str(r#"{ "output_path": "/store/out.bin", "index": null, "token": null }"#).unwrap();
    let result = jar.create_job("square", id("square"), kwargs([("x", stray.into())]), ResourceRequest::default());

    assert!(matches!(result, Err(Error::UnknownJob)));
}

#[test]
fn test_deferred_value_of_another_jar_is_rejected() {
    let fixture = Fixture::new();
    let other_dir = TempDir::new().unwrap();
    let mut other = JobJar::new(JobOrganizer::new("other", other_dir.path()), Arc::clone(&fixture.registry)).with_transfer(fixture.transfer());
    let mut jar = fixture.jar();

    let foreign = other.create_job("square", id("square"), kwargs([("x", Value::Int(2))]), ResourceRequest::default()).unwrap();
    let own = jar.create_job("square", id("square"), kwargs([("x", Value::Int(3))]), ResourceRequest::default()).unwrap();
    assert_eq!(foreign, own);

    let output = other.job(foreign).unwrap().output().unwrap();
    let result = jar.create_job("square", id("square"), kwargs([("x", output.into())]), ResourceRequest::default());

    assert!(matches!(result, Err(Error::UnknownJob)));
    assert_eq!(jar.len(), 1);
}

#[test]
fn test_jobs_run_in_stage_order() {
    let fixture = Fixture::new();
    let mut jar = fixture.jar();

    let divide = jar.create_job("divide", id("divide"), kwargs([("a", Value::Int(17)), ("b", Value::Int(5))]), ResourceRequest::default()).unwrap();
    let quotient = jar.job(divide).unwrap().get(0).unwrap();
    let remainder = jar.job(divide).unwrap().get(1).unwrap();
    let whole = jar.job(divide).unwrap().output().unwrap();

    let square = jar.create_job("square", id("square"), kwargs([("x", quotient.into())]), ResourceRequest::default()).unwrap();
    let squared = jar.job(square).unwrap().output().unwrap();

    let values = Value::Sequence(vec![remainder.into(), squared.into()]);
    let combine = jar
        .create_job_in_group("combine", id("combine"), kwargs([("values", values), ("label", Value::from("run"))]), ResourceRequest::new(2, 512), &["summary"])
        .unwrap();
    let echo = jar.create_job("echo", id("echo"), kwargs([("value", whole.into())]), ResourceRequest::default()).unwrap();

    for job in [divide, square, combine, echo] {
        jar.add(job).unwrap();
    }
    let makeflow = jar.compile("/opt/site/wrapper.sh").unwrap();
    assert_eq!(makeflow.rules().len(), 4);
    assert!(jar.makeflow_file().exists());
    assert!(jar.invoker_script().exists());

    let combine_rule = &makeflow.rules()[2];
    assert!(combine_rule.inputs.contains(&jar.job(divide).unwrap().out_file().to_string_lossy().into_owned()));
    assert!(combine_rule.inputs.contains(&jar.job(square).unwrap().out_file().to_string_lossy().into_owned()));
    assert_eq!(combine_rule.category.as_ref().unwrap().resources, ResourceRequest::new(2, 512));

    let param_dir = jar.makeflow_dir().join("parameters");
    let options = ExecutionOptions { transfer: fixture.transfer() };
    for entry in jar.graph().iter() {
        execute_stage(&parameter_file(&param_dir, entry.stage.name().as_str()), &fixture.registry, &options).unwrap();
    }

    assert_eq!(jar.job(divide).unwrap().result().unwrap(), Value::Tuple(vec![Value::Int(3), Value::Int(2)]));
    assert_eq!(jar.job(square).unwrap().result().unwrap(), Value::Int(9));
    assert_eq!(
        jar.job(combine).unwrap().result().unwrap(),
        Value::keyed([("label", Value::from("run")), ("total", Value::Int(11))])
    );
    assert_eq!(jar.job(echo).unwrap().result().unwrap(), Value::Tuple(vec![Value::Int(3), Value::Int(2)]));
    assert!(jar.job(combine).unwrap().out_file().starts_with(fixture.jar_dir.path().join("out").join("summary")));
}

#[test]
fn test_failing_job_publishes_no_output() {
    let fixture = Fixture::new();
    let mut jar = fixture.jar();

    let divide = jar.create_job("divide", id("divide"), kwargs([("a", Value::Int(1)), ("b", Value::from("zero"))]), ResourceRequest::default()).unwrap();
    jar.add(divide).unwrap();
    jar.compile("/opt/site/wrapper.sh").unwrap();

    let param_file = parameter_file(&jar.makeflow_dir().join("parameters"), "divide_0");
    let result = execute_stage(&param_file, &fixture.registry, &ExecutionOptions { transfer: fixture.transfer() });

    assert!(matches!(result, Err(Error::Invocation(_))));
    assert!(jar.job(divide).unwrap().result().unwrap_err().is_busy());
    assert_eq!(std::fs::read_dir(fixture.scratch.path()).unwrap().count(), 0);
}
