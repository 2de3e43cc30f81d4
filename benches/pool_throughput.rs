use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use std::hint::black_box;
use std::sync::Arc;
use vigil::config::SchedulerConfig;
use vigil::scheduler::TaskExecutor;
use vigil::{EventBus, Issue, Severity, SourceFile, Task, TaskError, TaskOutput, WorkerPool};

fn line_scanner() -> Arc<dyn TaskExecutor> {
    Arc::new(|task: &Task| -> Result<TaskOutput, TaskError> {
        let issues = task
            .file
            .content
            .lines()
            .enumerate()
            .filter(|(_, line)| line.contains("unsafe"))
            .map(|(n, _)| Issue::new("unsafe", Severity::Low, "unsafe block").at(n + 1, 1))
            .collect();
        Ok(TaskOutput {
            issues,
            ..Default::default()
        })
    })
}

fn create_files(count: usize) -> Vec<SourceFile> {
    (0..count)
        .map(|i| {
            let body: String = (0..200)
                .map(|line| {
                    if line % 25 == 0 {
                        format!("unsafe {{ ptr_{i}_{line}.read() }}\n")
                    } else {
                        format!("let value_{line} = compute({i}, {line});\n")
                    }
                })
                .collect();
            SourceFile::new(format!("src/file_{i}.rs"), body)
        })
        .collect()
}

fn benchmark_pool_throughput(c: &mut Criterion) {
    let files = create_files(256);
    let mut group = c.benchmark_group("pool_throughput");
    group.throughput(Throughput::Elements(files.len() as u64));

    for workers in [1, 2, 4, 8] {
        let config = SchedulerConfig {
            max_workers: workers,
            ..Default::default()
        };
        let pool = WorkerPool::new(&config, line_scanner(), EventBus::new()).unwrap();

        group.bench_with_input(BenchmarkId::from_parameter(workers), &files, |b, files| {
            b.iter(|| {
                let handles: Vec<_> = files
                    .iter()
                    .map(|f| pool.submit(Task::new("unsafe", f.clone())))
                    .collect();
                let issues: usize = handles
                    .into_iter()
                    .filter_map(|h| h.wait(None).outcome.ok())
                    .map(|o| o.issues.len())
                    .sum();
                black_box(issues)
            })
        });
        pool.shutdown();
    }

    group.finish();
}

criterion_group!(benches, benchmark_pool_throughput);
criterion_main!(benches);
