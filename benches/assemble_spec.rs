use criterion::{BatchSize, Criterion, criterion_group, criterion_main};
use serde_json::json;
use vizbind::{
    assemble::assemble_spec,
    concept::{fields_for_table, original_field_id},
    encoding::{AggregateOp, Channel, EncodingItem, EncodingMap},
    table::{Row, Table, build_table},
};

fn generate_population(rows: usize) -> Table {
    let data = (0..rows)
        .map(|i| {
            let sex = if i % 2 == 0 { "F" } else { "M" };
            let band = (i % 10) * 10;
            let mut row = Row::new();
            row.insert("Country".to_string(), json!(format!("C{}", i % 25)));
            row.insert("Sex".to_string(), json!(sex));
            row.insert("Age".to_string(), json!(format!("{band}-{}", band + 9)));
            row.insert("Population".to_string(), json!((i * 37) % 100_000));
            row
        })
        .collect::<Vec<_>>();
    build_table("population", &data, true, None)
}

fn bench_assemble(c: &mut Criterion) {
    let table = generate_population(20_000);
    let fields = fields_for_table(&table);
    let field = |name: &str| EncodingItem::bound(&original_field_id("population", name));

    let bar = EncodingMap::from([
        (Channel::X, field("Age")),
        (Channel::Y, field("Population").with_aggregate(AggregateOp::Sum)),
        (Channel::Color, field("Sex")),
    ]);
    let pyramid = EncodingMap::from([
        (Channel::X, field("Population").with_aggregate(AggregateOp::Sum)),
        (Channel::Y, field("Age")),
        (Channel::Color, field("Sex")),
    ]);

    let mut group = c.benchmark_group("assemble_spec");

    group.bench_function("bar_chart", |b| {
        b.iter(|| assemble_spec("Bar Chart", &bar, &fields, &table).expect("bar spec"));
    });

    group.bench_function("pyramid_chart", |b| {
        b.iter_batched(
            || (),
            |_| assemble_spec("Pyramid Chart", &pyramid, &fields, &table).expect("pyramid spec"),
            BatchSize::SmallInput,
        );
    });

    group.bench_function("build_table", |b| {
        let rows = table.rows().to_vec();
        b.iter(|| build_table("population", &rows, true, None));
    });

    group.finish();
}

criterion_group!(benches, bench_assemble);
criterion_main!(benches);
