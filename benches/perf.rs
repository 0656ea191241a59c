use criterion::{Criterion, criterion_group, criterion_main};
use std::hint::black_box;

use fbref_pipeline::join::join_stat_tables;
use fbref_pipeline::table::{Table, Value};

fn stat_table(stat_col: &str, matches: usize, teams: usize) -> Table {
    let mut t = Table::new(vec!["MatchURL", "Team", "Season_End_Year", stat_col]);
    for m in 0..matches {
        for team in 0..teams {
            t.push_row(vec![
                Some(Value::Str(format!("/en/matches/m{m}/X"))),
                Some(Value::Str(format!("Team {team}"))),
                Some(Value::Int(2023)),
                Some(Value::Int((m * teams + team) as i64)),
            ]);
        }
    }
    t
}

fn with_duplicates(table: &Table) -> Table {
    let mut doubled = table.clone();
    for row in table.rows() {
        doubled.push_row(row.clone());
    }
    doubled
}

fn bench_join_stat_tables(c: &mut Criterion) {
    let tables = vec![
        stat_table("Gls", 400, 2),
        stat_table("Tkl_Tackles", 400, 2),
        stat_table("Touches_Touches", 400, 2),
    ];
    c.bench_function("join_stat_tables", |b| {
        b.iter(|| {
            let joined = join_stat_tables(
                black_box(tables.clone()),
                &["MatchURL", "Team", "Season_End_Year"],
                &[],
            )
            .unwrap();
            black_box(joined.height());
        })
    });
}

fn bench_unique_and_sort(c: &mut Criterion) {
    let table = with_duplicates(&stat_table("Gls", 2000, 2));
    c.bench_function("unique_and_sort", |b| {
        b.iter(|| {
            let mut merged = black_box(&table).unique();
            merged.sort_by(&["Season_End_Year", "Team", "MatchURL"]);
            black_box(merged.height());
        })
    });
}

fn bench_concat_diagonal(c: &mut Criterion) {
    let a = stat_table("Gls", 1000, 2);
    let b_table = stat_table("Sh", 1000, 2);
    c.bench_function("concat_diagonal", |b| {
        b.iter(|| {
            let merged = Table::concat_diagonal(black_box(vec![a.clone(), b_table.clone()]));
            black_box(merged.height());
        })
    });
}

fn bench_group_max(c: &mut Criterion) {
    let table = with_duplicates(&stat_table("Gls", 1000, 2));
    c.bench_function("group_max", |b| {
        b.iter(|| {
            let grouped = black_box(&table).group_max(&["MatchURL", "Team"]);
            black_box(grouped.height());
        })
    });
}

fn bench_csv_type_inference(c: &mut Criterion) {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("bench.csv");
    let table = stat_table("Gls", 2000, 2);
    table.write_csv(&path).expect("write fixture");

    c.bench_function("csv_type_inference", |b| {
        b.iter(|| {
            let parsed = Table::read_csv(black_box(&path)).unwrap();
            black_box(parsed.height());
        })
    });
}

criterion_group!(
    perf,
    bench_join_stat_tables,
    bench_unique_and_sort,
    bench_concat_diagonal,
    bench_group_max,
    bench_csv_type_inference
);
criterion_main!(perf);
