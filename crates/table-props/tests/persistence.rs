use plate_table_props::{
    AttributeCommand, Editor, ExecuteOptions, PlateValue, PluginRegistry, Point, Selection,
};
use serde_json::json;

#[test]
fn table_attributes_survive_save_and_load() {
    let mut editor = Editor::with_table_plugins();
    editor
        .run_command("table.insert", Some(json!({ "rows": 1, "cols": 1 })))
        .unwrap();
    AttributeCommand::new("width")
        .execute(&mut editor, ExecuteOptions::set("120px"))
        .unwrap();

    let saved = PlateValue::from_document(editor.doc().clone())
        .to_json_pretty()
        .unwrap();
    let loaded = PlateValue::from_json_str(&saved).unwrap();
    assert_eq!(loaded.schema, "plate-table-props");
    assert_eq!(loaded.version, 1);

    let doc = loaded.into_document();
    let selection = Selection::collapsed(Point::new(vec![1, 0, 0, 0, 0], 0));
    let reopened = Editor::new(doc, selection, PluginRegistry::tables());

    let mut width = AttributeCommand::new("width");
    width.refresh(&reopened);
    assert_eq!(width.value(), Some(&json!("120px")));
}

#[test]
fn schema_and_version_default_when_missing() {
    let value = PlateValue::from_json_str(
        r#"{
            "document": {
                "children": [
                    {
                        "node": "element",
                        "kind": "table",
                        "attrs": { "alignment": "right" },
                        "children": []
                    }
                ]
            }
        }"#,
    )
    .unwrap();

    assert_eq!(value.schema, "plate-table-props");
    assert_eq!(value.version, 1);

    let doc = value.into_document();
    let table = doc.element(&[0]).unwrap();
    assert_eq!(table.attr("alignment"), Some(&json!("right")));
}
