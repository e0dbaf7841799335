use bson::{Document as BsonDocument, doc};
use nexus_map::aggregation::{
    AggregationContext, AggregationOptions, CURRENT, ProjectionOperation, ROOT, group, limit, matching, new_aggregation,
    new_typed_aggregation, project, skip, sort, unwind, unwind_preserve, unwind_with_index,
};
use nexus_map::mapping::{MappingContext, PersistentEntity, PersistentProperty as Prop, PropertyType};
use nexus_map::{MapperConfig, MappingError};
use nexus_map::query::{Criteria, Direction};
use pretty_assertions::assert_eq;

fn pipeline(agg: &nexus_map::Aggregation) -> Result<Vec<BsonDocument>, MappingError> {
    let cfg = MapperConfig::default();
    let mut ctx = AggregationContext::untyped(&cfg);
    agg.to_pipeline(&mut ctx)
}

#[test]
fn fields_do_not_survive_a_group() {
    let agg = new_aggregation(vec![
        project(&["a", "b"]).into(),
        group(&["a"]).count().alias("cnt").into(),
        project(&["cnt", "b"]).into(),
    ])
    .unwrap();
    let err = pipeline(&agg).unwrap_err();
    match err {
        MappingError::InvalidReference { stage, field } => {
            assert_eq!(field, "b");
            assert_eq!(stage, "stage 3 ($project)");
        }
        other => panic!("unexpected error {other}"),
    }
}

#[test]
fn unwind_keeps_incoming_fields() {
    let agg = new_aggregation(vec![
        project(&["a", "b"]).into(),
        unwind("a").into(),
        project(&["a", "b"]).into(),
    ])
    .unwrap();
    assert_eq!(
        pipeline(&agg).unwrap(),
        vec![
            doc! { "$project": { "a": 1, "b": 1 } },
            doc! { "$unwind": "$a" },
            doc! { "$project": { "a": 1, "b": 1 } },
        ]
    );
}

#[test]
fn unwind_index_becomes_referenceable() {
    let agg = new_aggregation(vec![
        project(&["a", "b"]).into(),
        unwind_with_index("a", "x").into(),
        project(&["x", "b"]).into(),
    ])
    .unwrap();
    let stages = pipeline(&agg).unwrap();
    assert_eq!(stages[2], doc! { "$project": { "x": 1, "b": 1 } });

    let without_index = new_aggregation(vec![
        project(&["a"]).into(),
        unwind_preserve("a").into(),
        project(&["x"]).into(),
    ])
    .unwrap();
    assert!(matches!(pipeline(&without_index), Err(MappingError::InvalidReference { .. })));
}

#[test]
fn match_keeps_incoming_fields() {
    let agg = new_aggregation(vec![
        project(&["a", "b"]).into(),
        matching(&Criteria::where_("a").gte(1)).unwrap().into(),
        project(&["a", "b"]).into(),
    ])
    .unwrap();
    let stages = pipeline(&agg).unwrap();
    assert_eq!(stages[1], doc! { "$match": { "a": { "$gte": 1 } } });
    assert_eq!(stages[2], doc! { "$project": { "a": 1, "b": 1 } });
}

#[test]
fn group_keys_are_read_from_id() {
    let agg = new_aggregation(vec![
        group(&["a"]).count().alias("aCnt").into(),
        project(&["aCnt", "a"]).into(),
        sort(Direction::Desc, &["a"]).into(),
    ])
    .unwrap();
    assert_eq!(
        pipeline(&agg).unwrap(),
        vec![
            doc! { "$group": { "_id": "$a", "aCnt": { "$sum": 1 } } },
            doc! { "$project": { "aCnt": 1, "a": "$_id.a" } },
            doc! { "$sort": { "a": -1 } },
        ]
    );
}

#[test]
fn sort_directly_after_group_uses_id_path() {
    let agg = new_aggregation(vec![
        group(&["a", "b"]).count().alias("cnt").into(),
        sort(Direction::Asc, &["b"]).and(Direction::Desc, &["cnt"]).into(),
        skip(10).into(),
        limit(5).into(),
    ])
    .unwrap();
    let stages = pipeline(&agg).unwrap();
    assert_eq!(stages[1], doc! { "$sort": { "_id.b": 1, "cnt": -1 } });
    assert_eq!(stages[2], doc! { "$skip": 10_i64 });
    assert_eq!(stages[3], doc! { "$limit": 5_i64 });
}

#[test]
fn computed_projection_feeds_later_group() {
    let agg = new_aggregation(vec![
        project(&["a"]).and("b").plus(1).alias("foo").into(),
        group(&["a"]).sum("foo").alias("total").into(),
    ])
    .unwrap();
    assert_eq!(
        pipeline(&agg).unwrap(),
        vec![
            doc! { "$project": { "a": 1, "foo": { "$add": ["$b", 1] } } },
            doc! { "$group": { "_id": "$a", "total": { "$sum": "$foo" } } },
        ]
    );
}

#[test]
fn nested_group_key_projected_as_previous_operation() {
    let agg = new_aggregation(vec![
        unwind("rules").into(),
        group(&["rules.ruleType"]).count().alias("count").into(),
        project(&["count"]).and("ruleType").previous_operation().unwrap().into(),
    ])
    .unwrap();
    assert_eq!(
        pipeline(&agg).unwrap(),
        vec![
            doc! { "$unwind": "$rules" },
            doc! { "$group": { "_id": "$rules.ruleType", "count": { "$sum": 1 } } },
            doc! { "$project": { "count": 1, "_id": 0, "ruleType": "$_id" } },
        ]
    );
}

#[test]
fn composite_group_keys_keep_names() {
    let agg = new_aggregation(vec![
        group(&["a", "rules.ruleType"]).count().alias("cnt").into(),
        project(&["ruleType", "cnt"]).into(),
    ])
    .unwrap();
    assert_eq!(
        pipeline(&agg).unwrap(),
        vec![
            doc! { "$group": {
                "_id": { "a": "$a", "ruleType": "$rules.ruleType" },
                "cnt": { "$sum": 1 }
            } },
            doc! { "$project": { "ruleType": "$_id.ruleType", "cnt": 1 } },
        ]
    );
}

#[test]
fn aliases_chain_across_stages() {
    let agg = new_aggregation(vec![
        project(&[]).and("foo.bar").alias("ba").into(),
        project(&[]).and("ba").alias("b").into(),
    ])
    .unwrap();
    assert_eq!(
        pipeline(&agg).unwrap(),
        vec![doc! { "$project": { "ba": "$foo.bar" } }, doc! { "$project": { "b": "$ba" } }]
    );

    let stale = new_aggregation(vec![
        project(&[]).and("foo.bar").alias("ba").into(),
        project(&[]).and("foo").alias("b").into(),
    ])
    .unwrap();
    assert!(matches!(pipeline(&stale), Err(MappingError::InvalidReference { ref field, .. }) if field == "foo"));
}

#[test]
fn system_variables_are_never_checked() {
    let current_a = format!("{CURRENT}.a");
    let agg = new_aggregation(vec![
        project(&["a"]).and(&current_a).alias("a2").into(),
        group(&["a"]).first(ROOT).alias("doc").into(),
    ])
    .unwrap();
    assert_eq!(
        pipeline(&agg).unwrap(),
        vec![
            doc! { "$project": { "a": 1, "a2": "$$CURRENT.a" } },
            doc! { "$group": { "_id": "$a", "doc": { "$first": "$$ROOT" } } },
        ]
    );
}

#[test]
fn exclusion_only_projection_hides_field() {
    let agg = new_aggregation(vec![
        ProjectionOperation::default().and_exclude(&["secret"]).unwrap().into(),
        project(&["secret"]).into(),
    ])
    .unwrap();
    let err = pipeline(&agg).unwrap_err();
    assert!(matches!(err, MappingError::InvalidReference { ref field, .. } if field == "secret"));

    let visible = new_aggregation(vec![
        ProjectionOperation::default().and_exclude(&["secret"]).unwrap().into(),
        project(&["other"]).into(),
    ])
    .unwrap();
    assert_eq!(pipeline(&visible).unwrap()[1], doc! { "$project": { "other": 1 } });
}

#[test]
fn match_after_group_filters_on_group_key_path() {
    let agg = new_aggregation(vec![
        group(&["a"]).count().alias("cnt").into(),
        matching(&Criteria::where_("a").is(1)).unwrap().into(),
        matching(&Criteria::where_("cnt").gt(2)).unwrap().into(),
    ])
    .unwrap();
    let stages = pipeline(&agg).unwrap();
    assert_eq!(stages[1], doc! { "$match": { "_id.a": 1 } });
    assert_eq!(stages[2], doc! { "$match": { "cnt": { "$gt": 2 } } });
}

#[test]
fn default_command_has_no_options() {
    let agg = new_aggregation(vec![project(&["a"]).into()]).unwrap();
    let cfg = MapperConfig::default();
    let mut ctx = AggregationContext::untyped(&cfg);
    assert_eq!(
        agg.to_command("foo", &mut ctx).unwrap(),
        doc! { "aggregate": "foo", "pipeline": [ { "$project": { "a": 1 } } ] }
    );
}

#[test]
fn custom_options_follow_pipeline() {
    let agg = new_aggregation(vec![project(&["a"]).into()])
        .unwrap()
        .with_options(AggregationOptions::default().allow_disk_use(true).cursor(doc! { "batchSize": 2 }));
    let cfg = MapperConfig::default();
    let mut ctx = AggregationContext::untyped(&cfg);
    let command = agg.to_command("foo", &mut ctx).unwrap();
    assert!(command.get_bool("allowDiskUse").unwrap());
    assert!(command.get("explain").is_none());
    assert_eq!(command.get_document("cursor").unwrap(), &doc! { "batchSize": 2 });
    let keys: Vec<&str> = command.keys().map(String::as_str).collect();
    assert_eq!(keys, vec!["aggregate", "pipeline", "allowDiskUse", "cursor"]);
}

fn product_model() -> MappingContext {
    let mut ctx = MappingContext::new();
    ctx.register(
        PersistentEntity::builder("Product")
            .property(Prop::new("id", PropertyType::string()))
            .property(Prop::new("netPrice", PropertyType::Simple(nexus_map::mapping::SimpleType::Double)).field("net_price"))
            .property(Prop::new("tags", PropertyType::array_of(PropertyType::string())))
            .property(Prop::new("name", PropertyType::string()))
            .build()
            .unwrap(),
    )
    .unwrap();
    ctx
}

#[test]
fn typed_aggregation_uses_field_names() {
    let model = product_model();
    let cfg = MapperConfig::default();
    let agg = new_typed_aggregation(
        "Product",
        vec![
            matching(&Criteria::where_("netPrice").gt(10)).unwrap().into(),
            project(&["netPrice", "id"]).into(),
            sort(Direction::Desc, &["netPrice"]).into(),
        ],
    )
    .unwrap();
    assert_eq!(agg.input_type(), Some("Product"));
    let mut ctx = agg.context(&model, &cfg).unwrap();
    assert_eq!(
        agg.to_command("product", &mut ctx).unwrap(),
        doc! {
            "aggregate": "product",
            "pipeline": [
                { "$match": { "net_price": { "$gt": 10 } } },
                { "$project": { "netPrice": "$net_price", "id": "$_id" } },
                { "$sort": { "netPrice": -1 } },
            ]
        }
    );
}

#[test]
fn typed_root_rejects_unknown_properties() {
    let model = product_model();
    let cfg = MapperConfig::default();
    let agg = new_typed_aggregation("Product", vec![project(&["price"]).into()]).unwrap();
    let mut ctx = agg.context(&model, &cfg).unwrap();
    let err = agg.to_pipeline(&mut ctx).unwrap_err();
    assert_eq!(err.to_string(), "Invalid reference 'price' in stage 1 ($project)");

    let unknown = new_typed_aggregation("Order", vec![project(&["a"]).into()]).unwrap();
    assert!(matches!(unknown.context(&model, &cfg), Err(MappingError::Metadata(_))));
    assert!(new_typed_aggregation("  ", vec![project(&["a"]).into()]).is_err());
}

#[test]
fn typed_exclusion_keeps_other_properties_resolvable() {
    let model = product_model();
    let cfg = MapperConfig::default();
    let agg = new_typed_aggregation(
        "Product",
        vec![
            ProjectionOperation::default().and_exclude(&["name"]).unwrap().into(),
            project(&["netPrice"]).into(),
        ],
    )
    .unwrap();
    let mut ctx = agg.context(&model, &cfg).unwrap();
    assert_eq!(
        agg.to_pipeline(&mut ctx).unwrap(),
        vec![
            doc! { "$project": { "name": 0 } },
            doc! { "$project": { "netPrice": "$net_price" } },
        ]
    );
}

#[test]
fn typed_exclusion_uses_wire_name_and_hides_property() {
    let model = product_model();
    let cfg = MapperConfig::default();
    let agg = new_typed_aggregation(
        "Product",
        vec![
            ProjectionOperation::default().and_exclude(&["netPrice"]).unwrap().into(),
            matching(&Criteria::where_("name").is("x")).unwrap().into(),
            project(&["id", "tags"]).into(),
        ],
    )
    .unwrap();
    let mut ctx = agg.context(&model, &cfg).unwrap();
    assert_eq!(
        agg.to_pipeline(&mut ctx).unwrap(),
        vec![
            doc! { "$project": { "net_price": 0 } },
            doc! { "$match": { "name": "x" } },
            doc! { "$project": { "id": "$_id", "tags": 1 } },
        ]
    );

    let stale = new_typed_aggregation(
        "Product",
        vec![
            ProjectionOperation::default().and_exclude(&["netPrice"]).unwrap().into(),
            project(&["netPrice"]).into(),
        ],
    )
    .unwrap();
    let mut ctx = stale.context(&model, &cfg).unwrap();
    let err = stale.to_pipeline(&mut ctx).unwrap_err();
    assert_eq!(err.to_string(), "Invalid reference 'netPrice' in stage 2 ($project)");
}
