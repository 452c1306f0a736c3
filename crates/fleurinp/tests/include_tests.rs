//! Included file handling
//!
//! Edits see one combined tree; materialized decks keep their file split.

use fleurinp::task::{XPathAttrib, XPathSelect};
use fleurinp::{FleurinpModifier, INP_XML};
use fleurinp_test_utils::*;
use pretty_assertions::assert_eq;
use serde_json::json;

fn contents(deck: &fleurinp::FleurinpData, file: &str) -> String {
    String::from_utf8(deck.file(file).unwrap().to_vec()).unwrap()
}

#[test]
fn edits_inside_included_files_stay_there() {
    init_tracing();
    let (store, original) = store_with(split_deck());
    let mut session = FleurinpModifier::new(&store, original).unwrap();
    session
        .set_inpchanges([("itmax", json!(30))])
        .xml_set_attrib_value_no_create(XPathAttrib {
            xpath: "/fleurInput/cell/bzIntegration/kPointLists/kPointList".to_string(),
            name: "type".to_string(),
            value: json!("tria"),
            occurrences: None,
        });
    let modified = fetch_deck(&store, &session.freeze().unwrap());

    assert_eq!(
        modified.file_names().collect::<Vec<_>>(),
        vec!["inp.xml", "kpts.xml", "relax.xml", "sym.xml"]
    );
    let inp = contents(&modified, INP_XML);
    assert!(inp.contains("itmax=\"30\""));
    assert!(inp.contains("href=\"kpts.xml\""));
    assert!(inp.contains("href=\"sym.xml\""));
    assert!(!inp.contains("kPointList "));

    let kpts = contents(&modified, "kpts.xml");
    assert!(kpts.contains("type=\"tria\""));
    assert_eq!(contents(&modified, "sym.xml").matches("<symOp>").count(), 1);

    let tree = combined_tree(&modified);
    assert_eq!(attrib_values(&tree, "//kPointList", "type"), vec!["tria"]);
    assert_eq!(count_of(&tree, "/fleurInput/cell/symmetryOperations/symOp"), 1);
    assert_eq!(count_of(&tree, "/fleurInput/relaxation/displacements/displace"), 1);
}

#[test]
fn deleting_an_included_subtree_drops_its_file() {
    let (store, original) = store_with(split_deck());
    let mut session = FleurinpModifier::new(&store, original).unwrap();
    session.xml_delete_tag(XPathSelect {
        xpath: "/fleurInput/relaxation".to_string(),
        occurrences: None,
    });
    let modified = fetch_deck(&store, &session.freeze().unwrap());

    assert!(modified.file("relax.xml").is_none());
    assert!(!contents(&modified, INP_XML).contains("relax.xml"));
    assert!(modified.file("kpts.xml").is_some());
}

#[test]
fn file_tasks_run_before_the_tree_is_loaded() {
    let (store, original) = store_with(split_deck());
    let replacement = KPTS_XML.replace("type=\"mesh\"", "type=\"path\"");
    let mut session = FleurinpModifier::new(&store, original).unwrap();
    session
        .set_inpchanges([("itmax", json!(5))])
        .set_file("kpts.xml", replacement);
    assert!(session.queue().is_reordered());

    let preview = session.show().unwrap();
    assert_eq!(attrib_values(&preview.tree, "//kPointList", "type"), vec!["path"]);
    assert_eq!(attrib_values(&preview.tree, "//scfLoop", "itmax"), vec!["5"]);
}

#[test]
fn files_are_copied_from_other_decks() {
    let store = fleurinp_artifact::ArtifactStore::new();
    let original = store_deck(&store, split_deck());
    let mut donor_files = split_deck().to_builder();
    let inversion = "</symOp><symOp><row-1>-1 0 0 0</row-1><row-2>0 -1 0 0</row-2><row-3>0 0 -1 0</row-3></symOp>";
    donor_files.set_file("sym.xml", SYM_XML.replace("</symOp>", inversion));
    let donor = store_deck(&store, donor_files.build().unwrap());

    let mut session = FleurinpModifier::new(&store, original).unwrap();
    session.set_file_from_node("sym.xml", donor, None).unwrap();
    let hash = session.freeze().unwrap();
    let modified = fetch_deck(&store, &hash);

    let tree = combined_tree(&modified);
    assert_eq!(count_of(&tree, "/fleurInput/cell/symmetryOperations/symOp"), 2);
    assert_eq!(modified.identity(), hash);
    let inputs = store.inputs_of(&hash).unwrap();
    assert_eq!(inputs[&format!("files_{}", donor.short())], donor);
}
