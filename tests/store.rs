mod common;

use common::{TestWorkspace, derived_table, table};
use serde_json::json;
use vizbind::{
    concept::{FieldItem, original_field_id},
    encoding::{AggregateOp, Channel, Chart, EncodingItem},
    store::{Action, Session, StoreError},
};

fn session_with_people() -> Session {
    let mut session = Session::new();
    session
        .dispatch(Action::LoadTable(table(
            "people",
            json!([{"name": "Ann", "age": 31}, {"name": "Bo", "age": 42}]),
        )))
        .expect("load people");
    session
        .dispatch(Action::CreateChart(Chart::new("c1", "Bar Chart", "people")))
        .expect("create chart");
    session
}

fn age_id() -> String {
    original_field_id("people", "age")
}

#[test]
fn loading_a_table_registers_original_fields() {
    let session = session_with_people();
    assert!(session.field(&age_id()).is_some());
    assert!(session.field(&original_field_id("people", "name")).is_some());
    assert_eq!(session.fields.len(), 2);
}

#[test]
fn duplicate_tables_are_rejected() {
    let mut session = session_with_people();
    let err = session
        .dispatch(Action::LoadTable(table("people", json!([{"x": 1}]))))
        .unwrap_err();
    assert_eq!(err, StoreError::DuplicateTable("people".to_string()));
}

#[test]
fn derived_tables_need_their_sources() {
    let mut session = Session::new();
    let orphan = derived_table("T1", "T0", "filter", json!([{"x": 1}]));
    let err = session.dispatch(Action::LoadTable(orphan)).unwrap_err();
    assert_eq!(err, StoreError::UnknownTable("T0".to_string()));
}

#[test]
fn encodings_must_use_declared_channels() {
    let mut session = session_with_people();
    let err = session
        .dispatch(Action::SetEncoding {
            chart_id: "c1".to_string(),
            channel: Channel::Theta,
            item: EncodingItem::bound(&age_id()),
        })
        .unwrap_err();
    assert_eq!(
        err,
        StoreError::IllegalChannel {
            chart_type: "Bar Chart".to_string(),
            channel: Channel::Theta
        }
    );
}

#[test]
fn encodings_must_reference_known_fields() {
    let mut session = session_with_people();
    let err = session
        .dispatch(Action::SetEncoding {
            chart_id: "c1".to_string(),
            channel: Channel::X,
            item: EncodingItem::bound("ghost"),
        })
        .unwrap_err();
    assert_eq!(err, StoreError::UnknownField("ghost".to_string()));
}

#[test]
fn binned_aggregates_are_rejected() {
    let mut session = session_with_people();
    let mut item = EncodingItem::bound(&age_id()).with_aggregate(AggregateOp::Sum);
    item.bin = true;
    let err = session
        .dispatch(Action::SetEncoding {
            chart_id: "c1".to_string(),
            channel: Channel::Y,
            item,
        })
        .unwrap_err();
    assert!(matches!(err, StoreError::InvalidEncoding { channel: Channel::Y, .. }));
    assert!(session.chart("c1").expect("chart").encoding_map.is_empty());
}

#[test]
fn valid_encodings_are_stored() {
    let mut session = session_with_people();
    session
        .dispatch(Action::SetEncoding {
            chart_id: "c1".to_string(),
            channel: Channel::Y,
            item: EncodingItem::bound(&age_id()).with_aggregate(AggregateOp::Average),
        })
        .expect("set encoding");
    let chart = session.chart("c1").expect("chart");
    assert_eq!(chart.bound_field_ids().collect::<Vec<_>>(), vec![age_id().as_str()]);
}

#[test]
fn cyclic_derived_fields_are_rejected() {
    let mut session = session_with_people();
    let older = FieldItem::derived("older", "older", vec![age_id()], "age + 1").expect("parents");
    session.dispatch(Action::AddField(older)).expect("add older");

    let self_parent =
        FieldItem::derived("older", "older", vec!["older".to_string()], "older").expect("parents");
    let err = session.dispatch(Action::UpdateField(self_parent)).unwrap_err();
    assert_eq!(err, StoreError::CyclicField("older".to_string()));

    let oldest = FieldItem::derived("oldest", "oldest", vec!["older".to_string()], "older + 1")
        .expect("parents");
    session.dispatch(Action::AddField(oldest)).expect("add oldest");
    let looped = FieldItem::derived("older", "older", vec!["oldest".to_string()], "oldest")
        .expect("parents");
    let err = session.dispatch(Action::UpdateField(looped)).unwrap_err();
    assert_eq!(err, StoreError::CyclicField("older".to_string()));
}

#[test]
fn derived_fields_need_existing_parents() {
    let mut session = session_with_people();
    let field = FieldItem::derived("x", "x", vec!["missing".to_string()], "missing").expect("parents");
    let err = session.dispatch(Action::AddField(field)).unwrap_err();
    assert_eq!(err, StoreError::UnknownField("missing".to_string()));
}

#[test]
fn deleting_a_field_clears_dependents_and_encodings() {
    let mut session = session_with_people();
    let older = FieldItem::derived("older", "older", vec![age_id()], "age + 1").expect("parents");
    session.dispatch(Action::AddField(older)).expect("add older");
    session
        .dispatch(Action::SetEncoding {
            chart_id: "c1".to_string(),
            channel: Channel::X,
            item: EncodingItem::bound("older"),
        })
        .expect("bind older");

    session.dispatch(Action::DeleteField(age_id())).expect("delete age");
    assert!(session.field("older").is_none());
    let chart = session.chart("c1").expect("chart");
    assert_eq!(chart.encoding_map[&Channel::X].field_id, None);
}

#[test]
fn deleting_a_table_cascades_to_derived_tables_and_charts() {
    let mut session = session_with_people();
    session
        .dispatch(Action::LoadTable(derived_table(
            "adults",
            "people",
            "keep adults",
            json!([{"name": "Bo", "age": 42}]),
        )))
        .expect("load adults");
    session
        .dispatch(Action::CreateChart(Chart::new("c2", "Bar Chart", "adults")))
        .expect("chart on adults");
    session
        .dispatch(Action::LoadTable(table("other", json!([{"k": 1}]))))
        .expect("load other");

    session.dispatch(Action::DeleteTable("people".to_string())).expect("delete");
    assert_eq!(
        session.tables.iter().map(|t| t.id()).collect::<Vec<_>>(),
        vec!["other"]
    );
    assert!(session.charts.is_empty());
    assert_eq!(
        session.fields.iter().map(|f| f.id.as_str()).collect::<Vec<_>>(),
        vec![original_field_id("other", "k").as_str()]
    );
}

#[test]
fn unknown_targets_are_reported() {
    let mut session = session_with_people();
    assert_eq!(
        session.dispatch(Action::DeleteChart("nope".to_string())).unwrap_err(),
        StoreError::UnknownChart("nope".to_string())
    );
    assert_eq!(
        session.dispatch(Action::DeleteTable("nope".to_string())).unwrap_err(),
        StoreError::UnknownTable("nope".to_string())
    );
    assert_eq!(
        session
            .dispatch(Action::CreateChart(Chart::new("c9", "Sankey", "people")))
            .unwrap_err(),
        StoreError::UnknownChartType("Sankey".to_string())
    );
}

#[test]
fn reset_empties_the_session() {
    let mut session = session_with_people();
    session.dispatch(Action::Reset).expect("reset");
    assert_eq!(session, Session::default());
}

#[test]
fn sessions_round_trip_through_yaml_and_json() {
    let workspace = TestWorkspace::new();
    let mut session = session_with_people();
    session
        .dispatch(Action::LoadTable(derived_table(
            "adults",
            "people",
            "keep adults",
            json!([{"name": "Bo", "age": 42}]),
        )))
        .expect("load adults");
    session
        .dispatch(Action::SetEncoding {
            chart_id: "c1".to_string(),
            channel: Channel::X,
            item: EncodingItem::bound(&age_id()),
        })
        .expect("bind");

    for name in ["session.yaml", "session.json"] {
        let path = workspace.path().join(name);
        session.save(&path).expect("save session");
        let restored = Session::load(&path).expect("load session");
        assert_eq!(restored, session, "{name}");
    }
}

#[test]
fn loading_rejects_charts_that_break_invariants() {
    let workspace = TestWorkspace::new();
    let path = workspace.write(
        "corrupt.json",
        r#"{
  "charts": [
    {
      "id": "c9",
      "chartType": "Bar Chart",
      "tableRef": "nope",
      "encodingMap": {"theta": {"fieldID": "ghost", "aggregate": "sum", "bin": true}}
    }
  ]
}"#,
    );
    let err = Session::load(&path).unwrap_err();
    assert!(
        err.chain().any(|cause| cause.to_string() == "table 'nope' does not exist"),
        "{err:#}"
    );

    let mut session = session_with_people();
    let mut chart = Chart::new("c2", "Bar Chart", "people");
    chart.encoding_map.insert(
        Channel::X,
        EncodingItem {
            bin: true,
            ..EncodingItem::bound(&age_id()).with_aggregate(AggregateOp::Sum)
        },
    );
    session.charts.push(chart);
    assert!(matches!(
        session.validate(),
        Err(StoreError::InvalidEncoding { channel: Channel::X, .. })
    ));
    let path = workspace.path().join("bin_and_sum.yaml");
    session.save(&path).expect("save session");
    assert!(Session::load(&path).is_err());
}

#[test]
fn loading_rejects_cyclic_derived_fields() {
    let workspace = TestWorkspace::new();
    let mut session = session_with_people();
    let first = FieldItem::derived("f1", "f1", vec!["f2".to_string()], "f2 + 1").expect("parents");
    let second = FieldItem::derived("f2", "f2", vec!["f1".to_string()], "f1 + 1").expect("parents");
    session.fields.extend([first, second]);

    assert_eq!(
        session.validate(),
        Err(StoreError::UnknownField("f2".to_string()))
    );
    let path = workspace.path().join("cyclic.yaml");
    session.save(&path).expect("save session");
    assert!(Session::load(&path).is_err());
}

#[test]
fn validation_keeps_deleted_original_fields_deleted() {
    let mut session = session_with_people();
    session
        .dispatch(Action::DeleteField(age_id()))
        .expect("delete age");
    assert_eq!(session.validate(), Ok(()));

    session.charts[0]
        .encoding_map
        .insert(Channel::X, EncodingItem::bound(&age_id()));
    assert_eq!(
        session.validate(),
        Err(StoreError::UnknownField(age_id()))
    );
}

#[test]
fn validation_accepts_parents_stored_after_their_children() {
    let mut session = session_with_people();
    let scaled = FieldItem::derived("scaled", "scaled", vec![age_id()], "age * 2").expect("parents");
    let offset = FieldItem::derived("offset", "offset", vec![age_id()], "age + 1").expect("parents");
    session
        .dispatch(Action::AddField(scaled.clone()))
        .expect("add scaled");
    session
        .dispatch(Action::AddField(offset.clone()))
        .expect("add offset");
    let rewired = FieldItem::derived("scaled", "scaled", vec!["offset".to_string()], "offset * 2")
        .expect("parents");
    session
        .dispatch(Action::UpdateField(rewired))
        .expect("rewire scaled");

    assert_eq!(session.validate(), Ok(()));
}
