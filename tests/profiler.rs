use std::{
    collections::{HashMap, VecDeque},
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
};

use pretty_assertions::assert_eq;
use uis_memprof::{
    Aisle, Breakdown, CONFIG_TOTAL, DSM_DATA, DSM_DELTA_QUEUES, DSM_EXECUTOR, DSM_WSUBS, Error,
    Host, Lifecycle, MemoryProfiler, NoopRenderer, Partition, ProfilerConfig, SELECTED_TOTAL,
    SizeOf, Sizer, StoreSeries, TOTAL, WM_QUEUE, WM_WORKFLOWS, compute_sizes, size_of_fields,
};

const CATEGORIES: [&str; 4] = ["workflow", "task_proxies", "jobs", "edges"];

struct TaskProxy {
    id: String,
    state: String,
    outputs: Vec<String>,
}
size_of_fields!(TaskProxy { id, state, outputs });

struct Workflow {
    id: String,
    status: String,
}
size_of_fields!(Workflow { id, status });

impl Aisle for Workflow {
    fn len(&self) -> usize {
        [&self.id, &self.status]
            .iter()
            .filter(|field| !field.is_empty())
            .count()
    }
}

/// One workflow's data; it never holds edges.
struct FlowStore {
    workflow: Workflow,
    task_proxies: HashMap<String, TaskProxy>,
    jobs: HashMap<String, String>,
}
size_of_fields!(FlowStore {
    workflow,
    task_proxies,
    jobs
});

impl Partition for FlowStore {
    fn aisle(&self, category: &str) -> Option<&dyn Aisle> {
        match category {
            "workflow" => Some(&self.workflow),
            "task_proxies" => Some(&self.task_proxies),
            "jobs" => Some(&self.jobs),
            _ => None,
        }
    }
}

struct Executor {
    workers: usize,
    pending: VecDeque<String>,
}
size_of_fields!(Executor { workers, pending });

struct DataStoreMgr {
    data: HashMap<String, FlowStore>,
    w_subs: HashMap<String, Vec<u64>>,
    delta_queues: HashMap<String, HashMap<String, VecDeque<String>>>,
    executor: Arc<Executor>,
    config: Arc<Config>,
}
size_of_fields!(DataStoreMgr {
    data,
    w_subs,
    delta_queues,
    executor,
    config
});

struct WorkflowsMgr {
    workflows: HashMap<String, String>,
    queue: VecDeque<String>,
}
size_of_fields!(WorkflowsMgr { workflows, queue });

struct Config {
    settings: HashMap<String, String>,
}
size_of_fields!(Config { settings });

struct UiServer {
    data_store_mgr: DataStoreMgr,
    workflows_mgr: WorkflowsMgr,
    executor: Arc<Executor>,
    handlers: Vec<String>,
    resolvers: Vec<String>,
    config: Arc<Config>,
    hide_queue: AtomicBool,
}
size_of_fields!(UiServer {
    data_store_mgr,
    workflows_mgr,
    executor,
    handlers,
    resolvers,
    config
});

impl Host for UiServer {
    type Config = Config;

    fn categories(&self) -> Vec<String> {
        CATEGORIES.iter().map(|c| c.to_string()).collect()
    }

    fn partitions(&self) -> Vec<&dyn Partition> {
        self.data_store_mgr
            .data
            .values()
            .map(|flow| flow as &dyn Partition)
            .collect()
    }

    fn tracked_attributes(&self) -> Vec<(&'static str, &dyn SizeOf)> {
        let dsm = &self.data_store_mgr;
        let wm = &self.workflows_mgr;
        let mut tracked = vec![
            (DSM_DATA, &dsm.data as &dyn SizeOf),
            (DSM_WSUBS, &dsm.w_subs as &dyn SizeOf),
            (DSM_DELTA_QUEUES, &dsm.delta_queues as &dyn SizeOf),
            (DSM_EXECUTOR, &dsm.executor as &dyn SizeOf),
            (WM_WORKFLOWS, &wm.workflows as &dyn SizeOf),
        ];
        if !self.hide_queue.load(Ordering::SeqCst) {
            tracked.push((WM_QUEUE, &wm.queue as &dyn SizeOf));
        }
        tracked
    }

    fn detail_roots(&self, sizer: &mut Sizer, detail: usize) -> Vec<Breakdown> {
        vec![
            sizer.asized("workflows_mgr", &self.workflows_mgr, detail),
            sizer.asized("data_store_mgr", &self.data_store_mgr, detail),
            sizer.asized("executor", &self.executor, detail),
            sizer.asized("handlers", &self.handlers, detail),
            sizer.asized("resolvers", &self.resolvers, detail),
        ]
    }

    fn config(&self) -> &Config {
        &self.config
    }
}

fn flow(name: &str, tasks: usize) -> FlowStore {
    let task_proxies = (0..tasks)
        .map(|i| {
            let id = format!("~user/{name}//1/task{i}");
            let proxy = TaskProxy {
                id: id.clone(),
                state: "waiting".to_string(),
                outputs: vec!["submitted".to_string(), "started".to_string()],
            };
            (id, proxy)
        })
        .collect();
    FlowStore {
        workflow: Workflow {
            id: format!("~user/{name}"),
            status: "running".to_string(),
        },
        task_proxies,
        jobs: HashMap::from([(format!("~user/{name}//1/task0/01"), "running".to_string())]),
    }
}

fn server(flows: &[(&str, usize)]) -> UiServer {
    server_with_settings(
        flows,
        HashMap::from([("max_workers".to_string(), "4".to_string())]),
    )
}

fn server_with_settings(flows: &[(&str, usize)], settings: HashMap<String, String>) -> UiServer {
    let executor = Arc::new(Executor {
        workers: 4,
        pending: VecDeque::from(["update".to_string()]),
    });
    let config = Arc::new(Config { settings });
    UiServer {
        data_store_mgr: DataStoreMgr {
            data: flows
                .iter()
                .map(|(name, tasks)| (format!("~user/{name}"), flow(name, *tasks)))
                .collect(),
            w_subs: HashMap::from([("~user/one".to_string(), vec![0_u64; 1024])]),
            delta_queues: HashMap::new(),
            executor: Arc::clone(&executor),
            config: Arc::clone(&config),
        },
        workflows_mgr: WorkflowsMgr {
            workflows: flows
                .iter()
                .map(|(name, _)| (format!("~user/{name}"), "running".to_string()))
                .collect(),
            queue: VecDeque::new(),
        },
        executor,
        handlers: vec!["/graphql".to_string(), "/subscriptions".to_string()],
        resolvers: vec!["Resolvers".to_string()],
        config,
        hide_queue: AtomicBool::new(false),
    }
}

fn config_in(dir: &tempfile::TempDir) -> ProfilerConfig {
    ProfilerConfig {
        output_dir: dir.path().to_path_buf(),
        file_prefix: "memprof".to_string(),
        ..ProfilerConfig::default()
    }
}

fn empty_collection_size() -> usize {
    Vec::<()>::new().deep_size()
}

#[tokio::test]
async fn every_series_has_one_entry_per_sample() {
    let host = Arc::new(server(&[("one", 3), ("two", 5)]));
    let mut profiler = MemoryProfiler::new(host, ProfilerConfig::default());

    for _ in 0..3 {
        profiler.sample().await.unwrap();
    }

    let state = profiler.state();
    assert_eq!(state.series.len(), 3);
    assert_eq!(state.data.len(), 3);
    assert!(state.series.times.windows(2).all(|w| w[0] <= w[1]));

    assert_eq!(state.series.objects.len(), CATEGORIES.len());
    assert_eq!(state.series.size.len(), CATEGORIES.len() + 6);
    for series in state.series.objects.values().chain(state.series.size.values()) {
        assert_eq!(series.len(), 3);
    }
}

#[tokio::test]
async fn registry_follows_schema_then_attributes() {
    let host = Arc::new(server(&[("one", 1)]));
    let profiler = MemoryProfiler::new(host, ProfilerConfig::default());

    let keys: Vec<_> = profiler.state().series.size.keys().cloned().collect();
    assert_eq!(
        keys,
        vec![
            "workflow",
            "task_proxies",
            "jobs",
            "edges",
            "DSM-Data",
            "DSM-WSubs",
            "DSM-Delta-Qs",
            "DSM-Executor",
            "WM-Workflows",
            "WM-Queue",
        ]
    );
}

#[tokio::test]
async fn no_partitions_measure_as_empty_collections() {
    let host = Arc::new(server(&[]));
    let mut profiler = MemoryProfiler::new(host, ProfilerConfig::default());

    profiler.sample().await.unwrap();

    let series = &profiler.state().series;
    for category in CATEGORIES {
        assert_eq!(series.objects[category], vec![0]);
        assert_eq!(series.size[category], vec![empty_collection_size()]);
    }
}

#[tokio::test]
async fn counts_are_summed_over_partitions() {
    let host = Arc::new(server(&[("one", 3), ("two", 5)]));
    let mut profiler = MemoryProfiler::new(Arc::clone(&host), ProfilerConfig::default());

    profiler.sample().await.unwrap();

    let series = &profiler.state().series;
    // Each populated workflow counts once, whatever its fields.
    assert_eq!(series.objects["workflow"], vec![2]);
    assert_eq!(series.objects["task_proxies"], vec![8]);
    assert_eq!(series.objects["jobs"], vec![2]);

    let tasks: usize = host
        .data_store_mgr
        .data
        .values()
        .map(|flow| flow.task_proxies.deep_size())
        .sum();
    assert_eq!(series.size["task_proxies"], vec![tasks]);
}

#[tokio::test]
async fn category_missing_everywhere_is_empty() {
    let host = Arc::new(server(&[("one", 3)]));
    let mut profiler = MemoryProfiler::new(host, ProfilerConfig::default());

    profiler.sample().await.unwrap();

    let series = &profiler.state().series;
    assert_eq!(series.objects["edges"], vec![0]);
    assert_eq!(series.size["edges"], vec![empty_collection_size()]);
}

#[tokio::test]
async fn tracked_attributes_are_shallow() {
    let host = Arc::new(server(&[("one", 50)]));
    let mut profiler = MemoryProfiler::new(Arc::clone(&host), ProfilerConfig::default());

    profiler.sample().await.unwrap();

    let series = &profiler.state().series;
    let data = &host.data_store_mgr.data;
    assert_eq!(series.size[DSM_DATA], vec![data.shallow_size()]);
    assert!(data.shallow_size() < data.deep_size());
}

#[test]
fn detail_snapshot_always_has_totals() {
    let host = server(&[("one", 3)]);

    let sizes = compute_sizes(&host, usize::MAX);

    let keys: Vec<_> = sizes.keys().map(String::as_str).collect();
    assert_eq!(keys, vec![SELECTED_TOTAL, CONFIG_TOTAL, TOTAL]);
}

#[test]
fn detail_snapshot_keeps_large_attributes() {
    let host = server(&[("one", 40)]);

    let sizes = compute_sizes(&host, 1000);

    // 1024 u64 subscriptions and 40 task proxies are over the threshold,
    // the empty queues are not.
    assert!(sizes["w_subs"] > 8 * 1024);
    assert!(sizes["data"] > 1000);
    assert!(!sizes.contains_key("queue"));
    assert!(!sizes.contains_key("delta_queues"));

    assert!(sizes[CONFIG_TOTAL] > 0);
    assert!(sizes[TOTAL] > sizes[SELECTED_TOTAL]);
}

#[test]
fn config_is_left_out_of_selected_total() {
    let payload = 50_000;
    let settings = HashMap::from([("motd".to_string(), "x".repeat(payload))]);
    let host = server_with_settings(&[("one", 1)], settings);

    let sizes = compute_sizes(&host, 1000);

    // The data-store manager shares the server's config, which only the
    // config and overall totals count.
    assert!(sizes[SELECTED_TOTAL] < payload);
    assert!(sizes[CONFIG_TOTAL] >= payload);
    assert!(sizes[TOTAL] >= payload);
    assert!(sizes[TOTAL] < sizes[SELECTED_TOTAL] + 2 * payload);
    assert_eq!(sizes.values().filter(|size| **size >= payload).count(), 2);
}

#[tokio::test]
async fn failed_sample_leaves_series_untouched() {
    let host = Arc::new(server(&[("one", 1)]));
    let mut profiler = MemoryProfiler::new(Arc::clone(&host), ProfilerConfig::default());
    profiler.sample().await.unwrap();

    host.hide_queue.store(true, Ordering::SeqCst);
    let err = profiler.sample().await.unwrap_err();

    assert!(matches!(err, Error::MissingAttribute { label } if label == WM_QUEUE));
    assert_eq!(profiler.state().series.len(), 1);
    assert_eq!(profiler.state().series.size["task_proxies"].len(), 1);
    assert_eq!(profiler.state().data.len(), 1);
}

#[tokio::test]
async fn report_with_one_sample_writes_only_json() {
    let dir = tempfile::tempdir().unwrap();
    let host = Arc::new(server(&[("one", 2)]));
    let mut profiler = MemoryProfiler::new(host, config_in(&dir));

    profiler.sample().await.unwrap();
    let report = profiler.report().await.unwrap();

    assert_eq!(report.store_plot, None);
    assert_eq!(report.attributes_plot, None);
    assert_eq!(report.firefox_profile, None);
    assert_eq!(
        report.store_dump,
        dir.path().join("memprof-store-workflow-mgrs.json")
    );
    assert_eq!(report.attributes_dump, dir.path().join("memprof-uis-attrs.json"));
    assert!(report.store_dump.exists());
    assert!(report.attributes_dump.exists());

    let pdfs = std::fs::read_dir(dir.path())
        .unwrap()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.path().extension().is_some_and(|ext| ext == "pdf"))
        .count();
    assert_eq!(pdfs, 0);
}

#[tokio::test]
async fn report_without_renderer_skips_plots() {
    let dir = tempfile::tempdir().unwrap();
    let host = Arc::new(server(&[("one", 2)]));
    let mut profiler =
        MemoryProfiler::new(host, config_in(&dir)).with_renderer(Box::new(NoopRenderer));

    profiler.sample().await.unwrap();
    profiler.sample().await.unwrap();
    let report = profiler.report().await.unwrap();

    assert_eq!(report.store_plot, None);
    assert_eq!(report.attributes_plot, None);
    assert!(report.store_dump.exists());
}

#[cfg(feature = "plot")]
#[tokio::test]
async fn report_with_two_samples_plots() {
    let dir = tempfile::tempdir().unwrap();
    let host = Arc::new(server(&[("one", 2), ("two", 4)]));
    let mut profiler = MemoryProfiler::new(host, config_in(&dir));

    profiler.sample().await.unwrap();
    profiler.sample().await.unwrap();
    let report = profiler.report().await.unwrap();

    let store_plot = report.store_plot.unwrap();
    let attributes_plot = report.attributes_plot.unwrap();
    assert_eq!(store_plot, dir.path().join("memprof-store-workflow-mgrs.pdf"));
    assert_eq!(attributes_plot, dir.path().join("memprof-uis-attrs.pdf"));
    for path in [store_plot, attributes_plot] {
        assert!(std::fs::read(path).unwrap().starts_with(b"%PDF"));
    }

    let chart = uis_memprof::store_chart(&profiler.state().series);
    let (x_low, x_high) = chart.x_range();
    let (y_low, y_high) = chart.left.y_range();
    assert_eq!((x_low, y_low), (0.0, 0.0));
    assert!(x_high > 0.0 && y_high > 0.0);
}

#[tokio::test]
async fn store_dump_round_trips() {
    let dir = tempfile::tempdir().unwrap();
    let host = Arc::new(server(&[("one", 2)]));
    let mut profiler =
        MemoryProfiler::new(host, config_in(&dir)).with_renderer(Box::new(NoopRenderer));

    profiler.sample().await.unwrap();
    profiler.sample().await.unwrap();
    let report = profiler.report().await.unwrap();

    let raw = std::fs::read_to_string(report.store_dump).unwrap();
    let parsed: StoreSeries = serde_json::from_str(&raw).unwrap();
    assert_eq!(&parsed, &profiler.state().series);

    let raw = std::fs::read_to_string(report.attributes_dump).unwrap();
    let pairs: Vec<(f64, HashMap<String, usize>)> = serde_json::from_str(&raw).unwrap();
    assert_eq!(pairs.len(), 2);
    assert_eq!(pairs[0].0, profiler.state().data[0].0);
    assert!(pairs.iter().all(|(_, sizes)| sizes.contains_key(TOTAL)));
}

#[tokio::test]
async fn firefox_profile_is_opt_in() {
    let dir = tempfile::tempdir().unwrap();
    let host = Arc::new(server(&[("one", 2)]));
    let config = ProfilerConfig {
        firefox_profile: true,
        ..config_in(&dir)
    };
    let mut profiler = MemoryProfiler::new(host, config).with_renderer(Box::new(NoopRenderer));

    profiler.sample().await.unwrap();
    let report = profiler.report().await.unwrap();

    let path = report.firefox_profile.unwrap();
    assert_eq!(
        path,
        dir.path().join("memprof-store-workflow-mgrs.profile.json")
    );
    assert!(std::fs::read_to_string(path).unwrap().contains("task_proxies"));
}

#[tokio::test]
async fn failed_report_keeps_accumulating() {
    let dir = tempfile::tempdir().unwrap();
    let host = Arc::new(server(&[("one", 1)]));
    let config = ProfilerConfig {
        output_dir: dir.path().join("missing"),
        ..config_in(&dir)
    };
    let mut profiler = MemoryProfiler::new(host, config).with_renderer(Box::new(NoopRenderer));

    profiler.sample().await.unwrap();
    let err = profiler.report().await.unwrap_err();

    assert!(matches!(err, Error::Io { .. }));
    assert_eq!(profiler.lifecycle(), Lifecycle::Accumulating);
    profiler.sample().await.unwrap();
    assert_eq!(profiler.state().series.len(), 2);
}

#[tokio::test]
async fn no_samples_after_report() {
    let dir = tempfile::tempdir().unwrap();
    let host = Arc::new(server(&[("one", 1)]));
    let mut profiler =
        MemoryProfiler::new(host, config_in(&dir)).with_renderer(Box::new(NoopRenderer));

    profiler.sample().await.unwrap();
    profiler.report().await.unwrap();

    assert_eq!(profiler.lifecycle(), Lifecycle::Reported);
    assert!(matches!(
        profiler.sample().await.unwrap_err(),
        Error::AlreadyReported
    ));
    assert_eq!(profiler.state().series.len(), 1);
}
