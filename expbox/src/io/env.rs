//! Creation-time environment snapshot (`extra.env_auto`).

use std::env;
use std::process::Command;
use std::time::Duration;

use serde_json::{Map, Value, json};
use tracing::debug;

use super::process::run_with_timeout;

/// Upper bound for the GPU query.
pub const GPU_PROBE_TIMEOUT: Duration = Duration::from_secs(2);
const PROBE_OUTPUT_LIMIT: usize = 64 * 1024;

const CLUSTER_VARS: [(&str, &str); 4] = [
    ("slurm_job_id", "SLURM_JOB_ID"),
    ("slurm_job_name", "SLURM_JOB_NAME"),
    ("slurm_nodelist", "SLURM_NODELIST"),
    ("pbs_jobid", "PBS_JOBID"),
];

/// One visible GPU.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GpuInfo {
    pub name: String,
    pub memory: String,
}

/// Collect the environment snapshot. Never fails; unknown values are `null`
/// and optional sections are left out.
pub fn collect_env_auto() -> Map<String, Value> {
    let mut env_auto = Map::new();
    env_auto.insert("platform".to_string(), Value::from(platform()));
    env_auto.insert(
        "runtime".to_string(),
        Value::from(format!("expbox {}", env!("CARGO_PKG_VERSION"))),
    );
    env_auto.insert(
        "executable".to_string(),
        env::current_exe()
            .ok()
            .map(|p| Value::from(p.display().to_string()))
            .unwrap_or(Value::Null),
    );
    env_auto.insert(
        "cwd".to_string(),
        env::current_dir()
            .ok()
            .map(|p| Value::from(p.display().to_string()))
            .unwrap_or(Value::Null),
    );
    env_auto.insert(
        "hostname".to_string(),
        hostname().map(Value::from).unwrap_or(Value::Null),
    );
    if let Some(gpus) = probe_gpus() {
        let list = gpus
            .into_iter()
            .map(|gpu| json!({"name": gpu.name, "memory": gpu.memory}))
            .collect();
        env_auto.insert("gpu".to_string(), Value::Array(list));
    }
    env_auto.insert(
        "cuda_visible_devices".to_string(),
        env::var("CUDA_VISIBLE_DEVICES")
            .ok()
            .map(Value::from)
            .unwrap_or(Value::Null),
    );
    if let Some(cluster) = cluster_hints(|name| env::var(name).ok()) {
        env_auto.insert("cluster".to_string(), Value::Object(cluster));
    }
    debug!(keys = env_auto.len(), "environment snapshot collected");
    env_auto
}

fn platform() -> String {
    let base = format!("{}-{}", env::consts::OS, env::consts::ARCH);
    match command_stdout("uname", &["-r"]) {
        Some(release) => format!("{base}-{release}"),
        None => base,
    }
}

fn hostname() -> Option<String> {
    env::var("HOSTNAME")
        .ok()
        .filter(|h| !h.trim().is_empty())
        .or_else(|| command_stdout("uname", &["-n"]))
}

fn command_stdout(program: &str, args: &[&str]) -> Option<String> {
    let mut cmd = Command::new(program);
    cmd.args(args);
    let out = run_with_timeout(cmd, GPU_PROBE_TIMEOUT, PROBE_OUTPUT_LIMIT)
        .map_err(|err| debug!(program, err = %err, "probe failed"))
        .ok()?
        .success_stdout()?;
    let out = out.trim();
    (!out.is_empty()).then(|| out.to_string())
}

/// Query `nvidia-smi`. `None` when the tool is missing, fails or times out.
pub fn probe_gpus() -> Option<Vec<GpuInfo>> {
    let mut cmd = Command::new("nvidia-smi");
    cmd.args(["--query-gpu=name,memory.total", "--format=csv,noheader"]);
    let out = run_with_timeout(cmd, GPU_PROBE_TIMEOUT, PROBE_OUTPUT_LIMIT)
        .map_err(|err| debug!(err = %err, "gpu probe unavailable"))
        .ok()?
        .success_stdout()?;
    let gpus = parse_gpu_lines(&out);
    (!gpus.is_empty()).then_some(gpus)
}

fn parse_gpu_lines(out: &str) -> Vec<GpuInfo> {
    out.lines()
        .filter_map(|line| {
            let (name, memory) = line.split_once(',')?;
            Some(GpuInfo {
                name: name.trim().to_string(),
                memory: memory.trim().to_string(),
            })
        })
        .filter(|gpu| !gpu.name.is_empty())
        .collect()
}

fn cluster_hints(lookup: impl Fn(&str) -> Option<String>) -> Option<Map<String, Value>> {
    let mut hints = Map::new();
    for (key, var) in CLUSTER_VARS {
        if let Some(value) = lookup(var).filter(|v| !v.is_empty()) {
            hints.insert(key.to_string(), Value::from(value));
        }
    }
    (!hints.is_empty()).then_some(hints)
}
