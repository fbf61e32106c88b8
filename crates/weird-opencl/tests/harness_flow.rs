//! End-to-end launch flow against the scripted runtime.
//!
//! Covers:
//!   - the exact runtime call sequence of a successful run
//!   - index validation for platforms and devices, including the 4-entry cap
//!   - source loading failures and what they leave unexecuted
//!   - build failures surfacing the compiler log
//!   - runtime call failures at every stage

use std::path::{Path, PathBuf};

use weird_opencl::backend::call;
use weird_opencl::{
    launch, Harness, HarnessConfig, HarnessError, LaunchRequest, ScriptedBackend,
    ScriptedPlatform, SelectionKind, Stage,
};

const KERNEL: &str = "__kernel void weird(__global uchar *out) { out[get_global_id(0)] = 1; }";

fn write_kernel(dir: &Path, name: &str, text: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, text).unwrap();
    path
}

fn config_for(sources: Vec<PathBuf>) -> HarnessConfig {
    HarnessConfig {
        source_files: sources,
        ..HarnessConfig::default()
    }
}

fn request(platform: i64, device: i64) -> LaunchRequest {
    LaunchRequest {
        platform_index: platform,
        device_index: device,
        compiler_flags: None,
    }
}

fn two_platforms() -> ScriptedBackend {
    ScriptedBackend::new(vec![
        ScriptedPlatform::new("Alpha", &["alpha-gpu", "alpha-cpu", "alpha-acc"]),
        ScriptedPlatform::new("Beta", &["beta-gpu"]),
    ])
}

// ── success path ─────────────────────────────────────────────────────────────

#[test]
fn successful_run_reports_sixty_four_lowercase_hex_chars() {
    let dir = tempfile::tempdir().unwrap();
    let config = config_for(vec![write_kernel(dir.path(), "weird.cl", KERNEL)]);
    let backend = two_platforms();

    let report = launch(&backend, &config, &request(2, 1)).unwrap();
    let hex = report.hex();

    assert_eq!(report.output.len(), 32);
    assert_eq!(hex.len(), 64);
    assert!(hex.chars().all(|c| matches!(c, '0'..='9' | 'a'..='f')), "got {hex}");
    assert_eq!(report.platform_name, "Beta");
    assert_eq!(report.device_name, "beta-gpu");
}

#[test]
fn successful_run_issues_calls_in_fixed_order() {
    let dir = tempfile::tempdir().unwrap();
    let config = config_for(vec![write_kernel(dir.path(), "weird.cl", KERNEL)]);
    let backend = ScriptedBackend::default();

    launch(&backend, &config, &request(1, 1)).unwrap();

    assert_eq!(
        backend.calls(),
        vec![
            call::GET_PLATFORM_IDS,
            call::GET_DEVICE_IDS,
            call::CREATE_CONTEXT,
            call::CREATE_COMMAND_QUEUE,
            call::CREATE_PROGRAM,
            call::BUILD_PROGRAM,
            call::CREATE_KERNEL,
            call::CREATE_BUFFER,
            call::SET_KERNEL_ARG,
            call::FINISH,
            call::ENQUEUE_ND_RANGE,
            call::FINISH,
            call::ENQUEUE_READ_BUFFER,
            call::FINISH,
        ]
    );
}

#[test]
fn skipping_pre_launch_finish_drops_one_call() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = config_for(vec![write_kernel(dir.path(), "weird.cl", KERNEL)]);
    config.finish_before_launch = false;
    let backend = ScriptedBackend::default();

    launch(&backend, &config, &request(1, 1)).unwrap();

    let finishes = backend.calls().iter().filter(|c| **c == call::FINISH).count();
    assert_eq!(finishes, 2);
}

#[test]
fn harness_reaches_reported_stage() {
    let dir = tempfile::tempdir().unwrap();
    let config = config_for(vec![write_kernel(dir.path(), "weird.cl", KERNEL)]);
    let backend = ScriptedBackend::default();

    let mut harness = Harness::new(&backend, &config);
    assert_eq!(harness.stage(), Stage::Init);
    harness.run(&request(1, 1)).unwrap();
    assert_eq!(harness.stage(), Stage::Reported);
    assert_eq!(harness.aborted_after(), None);
}

#[test]
fn harness_is_single_use() {
    let dir = tempfile::tempdir().unwrap();
    let config = config_for(vec![write_kernel(dir.path(), "weird.cl", KERNEL)]);
    let backend = ScriptedBackend::default();

    let mut harness = Harness::new(&backend, &config);
    harness.run(&request(1, 1)).unwrap();
    let calls_before = backend.calls().len();
    let err = harness.run(&request(1, 1)).unwrap_err();
    assert!(
        matches!(err, HarnessError::AlreadyFinished { stage: Stage::Reported }),
        "got {err}"
    );
    assert_eq!(backend.calls().len(), calls_before, "second run must not touch the runtime");
    assert_eq!(harness.stage(), Stage::Reported);
}

#[test]
fn aborted_harness_rejects_a_second_run() {
    let backend = ScriptedBackend::default();
    let config = config_for(vec![PathBuf::from("never-read.cl")]);

    let mut harness = Harness::new(&backend, &config);
    harness.run(&request(9, 1)).unwrap_err();
    let err = harness.run(&request(1, 1)).unwrap_err();
    assert_eq!(err.to_string(), "harness already finished at stage aborted");
    assert_eq!(harness.aborted_after(), Some(Stage::Init));
}

#[test]
fn repeated_runs_are_byte_identical() {
    let dir = tempfile::tempdir().unwrap();
    let config = config_for(vec![write_kernel(dir.path(), "weird.cl", KERNEL)]);

    let first = launch(&ScriptedBackend::default(), &config, &request(1, 1)).unwrap();
    let second = launch(&ScriptedBackend::default(), &config, &request(1, 1)).unwrap();
    assert_eq!(first.output, second.output);
    assert_eq!(first.hex(), second.hex());
}

#[test]
fn sources_reach_the_program_in_order_with_newlines() {
    let dir = tempfile::tempdir().unwrap();
    let a = write_kernel(dir.path(), "a.cl", "// a");
    let b = write_kernel(dir.path(), "b.cl", KERNEL);
    let config = config_for(vec![a, b]);
    let backend = ScriptedBackend::default();

    launch(&backend, &config, &request(1, 1)).unwrap();

    assert_eq!(backend.last_sources(), vec!["// a\n".to_string(), format!("{KERNEL}\n")]);
}

#[test]
fn compiler_flags_are_passed_verbatim() {
    let dir = tempfile::tempdir().unwrap();
    let config = config_for(vec![write_kernel(dir.path(), "weird.cl", KERNEL)]);
    let backend = ScriptedBackend::default();
    let req = LaunchRequest {
        compiler_flags: Some("-cl-std=CL2.0 -DWIDTH=32".into()),
        ..request(1, 1)
    };

    launch(&backend, &config, &req).unwrap();
    assert_eq!(backend.last_build_options().as_deref(), Some("-cl-std=CL2.0 -DWIDTH=32"));

    let backend = ScriptedBackend::default();
    launch(&backend, &config, &request(1, 1)).unwrap();
    assert_eq!(backend.last_build_options(), None);
}

// ── index validation ─────────────────────────────────────────────────────────

#[test]
fn platform_out_of_range_aborts_before_device_enumeration() {
    let backend = two_platforms();
    let config = config_for(vec![PathBuf::from("never-read.cl")]);

    for index in [0, 3, -1] {
        let mut harness = Harness::new(&backend, &config);
        let err = harness.run(&request(index, 1)).unwrap_err();
        match err {
            HarnessError::IndexOutOfRange { kind, count, index: got } => {
                assert_eq!(kind, SelectionKind::Platform);
                assert_eq!(count, 2);
                assert_eq!(got, index);
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(harness.stage(), Stage::Aborted);
        assert_eq!(harness.aborted_after(), Some(Stage::Init));
    }
    assert!(!backend.calls().contains(&call::GET_DEVICE_IDS));
}

#[test]
fn device_out_of_range_states_valid_range() {
    let backend = two_platforms();
    let config = config_for(vec![PathBuf::from("never-read.cl")]);

    let mut harness = Harness::new(&backend, &config);
    let err = harness.run(&request(1, 4)).unwrap_err();
    assert_eq!(
        err.to_string(),
        "ERROR: device should be between 1 and 3, inclusive, got 4"
    );
    assert_eq!(harness.aborted_after(), Some(Stage::PlatformSelected));
    assert!(!backend.calls().contains(&call::CREATE_CONTEXT));
}

#[test]
fn platform_with_no_devices_rejects_every_index() {
    let backend = ScriptedBackend::new(vec![ScriptedPlatform::new("Empty", &[])]);
    let config = HarnessConfig::default();
    let err = launch(&backend, &config, &request(1, 1)).unwrap_err();
    assert_eq!(
        err.to_string(),
        "ERROR: device should be between 1 and 0, inclusive, got 1"
    );
}

#[test]
fn enumeration_is_capped_at_four_entries() {
    let platforms: Vec<_> = (0..6)
        .map(|i| ScriptedPlatform::new(&format!("P{i}"), &["d0", "d1", "d2", "d3", "d4"]))
        .collect();
    let config = HarnessConfig::default();

    let err = launch(&ScriptedBackend::new(platforms.clone()), &config, &request(5, 1)).unwrap_err();
    assert!(matches!(
        err,
        HarnessError::IndexOutOfRange { kind: SelectionKind::Platform, count: 4, index: 5 }
    ));

    let err = launch(&ScriptedBackend::new(platforms), &config, &request(4, 5)).unwrap_err();
    assert!(matches!(
        err,
        HarnessError::IndexOutOfRange { kind: SelectionKind::Device, count: 4, index: 5 }
    ));
}

// ── source loading ───────────────────────────────────────────────────────────

#[test]
fn missing_source_names_file_and_skips_program_creation() {
    let dir = tempfile::tempdir().unwrap();
    let missing = dir.path().join("weird.cl");
    let backend = ScriptedBackend::default();
    let config = config_for(vec![missing]);

    let mut harness = Harness::new(&backend, &config);
    let err = harness.run(&request(1, 1)).unwrap_err();

    assert!(matches!(err, HarnessError::Io { .. }), "got {err}");
    assert!(err.to_string().contains("weird.cl"));
    assert_eq!(harness.aborted_after(), Some(Stage::ContextReady));
    assert!(!backend.calls().contains(&call::CREATE_PROGRAM));
}

// ── build ────────────────────────────────────────────────────────────────────

#[test]
fn build_failure_carries_compiler_log() {
    let dir = tempfile::tempdir().unwrap();
    let config = config_for(vec![write_kernel(dir.path(), "weird.cl", "not a kernel")]);
    let log = "<kernel>:1:1: error: unknown type name 'not'";
    let backend = ScriptedBackend::default().with_build_failure(log);

    let mut harness = Harness::new(&backend, &config);
    let err = harness.run(&request(1, 1)).unwrap_err();

    assert_eq!(err.build_log(), Some(log));
    assert_eq!(harness.aborted_after(), Some(Stage::SourceLoaded));
    let calls = backend.calls();
    assert_eq!(calls.last(), Some(&call::GET_BUILD_INFO));
    assert!(!calls.contains(&call::CREATE_KERNEL));
}

#[test]
fn failing_log_retrieval_is_a_runtime_error() {
    let dir = tempfile::tempdir().unwrap();
    let config = config_for(vec![write_kernel(dir.path(), "weird.cl", KERNEL)]);
    let backend = ScriptedBackend::default()
        .with_build_failure("ignored")
        .with_failing_call(call::GET_BUILD_INFO);

    let err = launch(&backend, &config, &request(1, 1)).unwrap_err();
    assert!(err.to_string().starts_with("clGetProgramBuildInfo failed"));
    assert!(err.build_log().is_none());
}

#[test]
fn missing_entry_point_fails_without_build_log() {
    let dir = tempfile::tempdir().unwrap();
    let config = config_for(vec![write_kernel(dir.path(), "weird.cl", KERNEL)]);
    let backend = ScriptedBackend::default().with_entry_points(&["strange"]);

    let err = launch(&backend, &config, &request(1, 1)).unwrap_err();
    assert!(err.to_string().starts_with("clCreateKernel failed"));
    assert!(err.build_log().is_none());
}

// ── runtime call failures ────────────────────────────────────────────────────

#[test]
fn queue_failure_names_the_versioned_entry_point() {
    let dir = tempfile::tempdir().unwrap();
    let config = config_for(vec![write_kernel(dir.path(), "weird.cl", KERNEL)]);
    let backend = ScriptedBackend::default().with_failing_call(call::CREATE_COMMAND_QUEUE);

    let err = launch(&backend, &config, &request(1, 1)).unwrap_err();
    assert_eq!(
        err.to_string(),
        "clCreateCommandQueueWithProperties failed (CL_OUT_OF_RESOURCES)"
    );
}

#[test]
fn every_runtime_call_failure_aborts_with_its_name() {
    let dir = tempfile::tempdir().unwrap();
    let config = config_for(vec![write_kernel(dir.path(), "weird.cl", KERNEL)]);

    let cases = [
        (call::GET_PLATFORM_IDS, Stage::Init),
        (call::GET_DEVICE_IDS, Stage::PlatformSelected),
        (call::CREATE_CONTEXT, Stage::DeviceSelected),
        (call::CREATE_COMMAND_QUEUE, Stage::DeviceSelected),
        (call::CREATE_PROGRAM, Stage::SourceLoaded),
        (call::BUILD_PROGRAM, Stage::SourceLoaded),
        (call::CREATE_BUFFER, Stage::ProgramBuilt),
        (call::SET_KERNEL_ARG, Stage::ProgramBuilt),
        (call::FINISH, Stage::KernelBound),
        (call::ENQUEUE_ND_RANGE, Stage::KernelBound),
        (call::ENQUEUE_READ_BUFFER, Stage::Launched),
    ];

    for (name, stage) in cases {
        let backend = ScriptedBackend::default().with_failing_call(name);
        let mut harness = Harness::new(&backend, &config);
        let err = harness.run(&request(1, 1)).unwrap_err();
        assert!(
            err.to_string().starts_with(&format!("{name} failed")),
            "{name}: got {err}"
        );
        assert_eq!(harness.aborted_after(), Some(stage), "{name}");
        assert_eq!(backend.calls().last(), Some(&name), "{name} must be the last call");
    }
}

#[test]
fn custom_geometry_and_output_size_are_honoured() {
    let dir = tempfile::tempdir().unwrap();
    let config = HarnessConfig {
        global_work_size: 16,
        local_work_size: 8,
        output_bytes: 16,
        ..config_for(vec![write_kernel(dir.path(), "weird.cl", KERNEL)])
    };
    let backend = ScriptedBackend::default().with_model(|gid| 0xf0 | gid as u8);

    let report = launch(&backend, &config, &request(1, 1)).unwrap();
    assert_eq!(report.output.len(), 16);
    assert_eq!(report.hex(), "f0f1f2f3f4f5f6f7f8f9fafbfcfdfeff");
}

// ── bundled kernel ───────────────────────────────────────────────────────────

#[test]
fn bundled_kernel_defines_the_default_entry_point() {
    let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("../../kernels/weird.cl");
    let sources = weird_opencl::load_sources(&[path]).unwrap();
    assert!(sources[0].text().contains("__kernel void weird("));
    assert!(sources[0].text().ends_with('\n'));

    let config = HarnessConfig::default();
    assert_eq!(config.kernel_name, "weird");
}
