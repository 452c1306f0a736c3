//! Task interpreter
//!
//! Replays XML tasks against a combined tree and the optional density matrix
//! side channel. Dispatch is an exhaustive match over [`XmlTask`], so every
//! task kind has exactly one handler. The first failing task aborts the run;
//! callers work on a copy, so nothing of a failed run is kept.

mod attrib;
mod files;
mod kpoints;
mod nmmp;
mod select;
mod species;
mod tags;

pub use files::apply_file_tasks;

pub(crate) use nmmp::size_mismatch;

use crate::data::{FleurinpData, NMMP_MAT};
use crate::error::{FleurinpError, Result};
use crate::kpoints::KpointsData;
use crate::task::XmlTask;
use fleurinp_xml::{Element, Schema};
use std::collections::BTreeMap;

/// Auxiliary data a task can reference by side-table key
#[derive(Debug, Clone, PartialEq)]
pub enum AuxNode {
    /// A k-point set for `set_kpointsdata`
    Kpoints(KpointsData),
    /// Another deck to copy files from with `set_file`
    Fleurinp(FleurinpData),
}

/// Side table of auxiliary data, by key
pub type AuxNodes = BTreeMap<String, AuxNode>;

/// What the XML tasks edit
#[derive(Debug, Clone, PartialEq)]
pub struct EditState {
    /// Combined input tree
    pub tree: Element,
    /// Lines of `n_mmp_mat`, if the deck has one or a task created it
    pub nmmp: Option<Vec<String>>,
}

impl EditState {
    /// State from a tree and the raw side channel file
    ///
    /// Blank lines of the side channel are dropped.
    ///
    /// # Errors
    /// [`FleurinpError::InvalidInput`] if the side channel is not UTF-8 text
    pub fn new(tree: Element, nmmp: Option<&[u8]>) -> Result<Self> {
        let nmmp = nmmp
            .map(|bytes| {
                std::str::from_utf8(bytes)
                    .map(|text| {
                        text.lines()
                            .filter(|l| !l.trim().is_empty())
                            .map(str::to_string)
                            .collect::<Vec<_>>()
                    })
                    .map_err(|e| FleurinpError::InvalidInput(format!("{NMMP_MAT} is not UTF-8 text: {e}")))
            })
            .transpose()?;
        Ok(Self { tree, nmmp })
    }

    /// Side channel file content; `None` when there is nothing to write
    #[must_use]
    pub fn nmmp_bytes(&self) -> Option<Vec<u8>> {
        self.nmmp.as_ref().filter(|lines| !lines.is_empty()).map(|lines| {
            let mut text = lines.join("\n");
            text.push('\n');
            text.into_bytes()
        })
    }
}

/// Applies XML tasks under one schema
#[derive(Debug, Clone, Copy)]
pub struct Interpreter<'a> {
    schema: &'a Schema,
    nodes: &'a AuxNodes,
}

impl<'a> Interpreter<'a> {
    /// Interpreter resolving names with `schema` and keys in `nodes`
    #[must_use]
    pub fn new(schema: &'a Schema, nodes: &'a AuxNodes) -> Self {
        Self { schema, nodes }
    }

    /// Apply tasks in order, stopping at the first failure
    ///
    /// # Errors
    /// The error of the first task that cannot be applied
    pub fn apply_all(&self, state: &mut EditState, tasks: &[XmlTask]) -> Result<()> {
        for (index, task) in tasks.iter().enumerate() {
            tracing::debug!(index, task = task.name(), "applying task");
            self.apply(state, task)?;
        }
        Ok(())
    }

    /// Apply one task
    ///
    /// # Errors
    /// [`crate::FleurinpError::PathNotFound`], [`crate::FleurinpError::Argument`]
    /// or [`crate::FleurinpError::MissingNode`] depending on the task
    pub fn apply(&self, state: &mut EditState, task: &XmlTask) -> Result<()> {
        let tree = &mut state.tree;
        match task {
            XmlTask::SetInpchanges(t) => self.set_inpchanges(tree, t),
            XmlTask::SetAttribValue(t) => self.set_attrib_value(tree, t, false),
            XmlTask::SetFirstAttribValue(t) => self.set_attrib_value(tree, t, true),
            XmlTask::SetText(t) => self.set_text(tree, t),
            XmlTask::SetSimpleTag(t) => self.set_simple_tag(tree, t),
            XmlTask::SetComplexTag(t) => self.set_complex_tag(tree, t),
            XmlTask::CreateTag(t) => self.create_tag(tree, t),
            XmlTask::DeleteTag(t) => self.delete_tag(tree, t),
            XmlTask::DeleteAtt(t) => self.delete_att(tree, t),
            XmlTask::ReplaceTag(t) => self.replace_tag(tree, t),
            XmlTask::XmlSetAttribValueNoCreate(t) => self.xml_set_attrib_value(tree, t),
            XmlTask::XmlSetTextNoCreate(t) => self.xml_set_text(tree, t),
            XmlTask::XmlCreateTag(t) => self.xml_create_tag(tree, t),
            XmlTask::XmlDeleteTag(t) => self.xml_delete_tag(tree, t),
            XmlTask::XmlDeleteAtt(t) => self.xml_delete_att(tree, t),
            XmlTask::XmlReplaceTag(t) => self.xml_replace_tag(tree, t),
            XmlTask::SetSpecies(t) => self.set_species(tree, t),
            XmlTask::SetSpeciesLabel(t) => self.set_species_label(tree, t),
            XmlTask::CloneSpecies(t) => self.clone_species(tree, t),
            XmlTask::SetAtomgroup(t) => self.set_atomgroup(tree, t),
            XmlTask::SetAtomgroupLabel(t) => self.set_atomgroup_label(tree, t),
            XmlTask::ShiftValue(t) => self.shift_value(tree, t),
            XmlTask::ShiftValueSpeciesLabel(t) => self.shift_value_species_label(tree, t),
            XmlTask::SetKpointsdata(t) => self.set_kpointsdata(tree, t),
            XmlTask::SwitchKpointset(t) => self.switch_kpointset(tree, t),
            XmlTask::SetNkpts(t) => self.set_nkpts(tree, t),
            XmlTask::SetNmmpmat(t) => self.set_nmmpmat(state, t),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FleurinpError;
    use crate::task::*;
    use fleurinp_xml::xpath::element_at;
    use fleurinp_xml::{parse_xml, text_of, BuiltinSchemas, SchemaRegistry, XPath};
    use pretty_assertions::assert_eq;
    use serde_json::{json, Map, Value};
    use std::sync::Arc;

    const INP: &str = r#"<?xml version="1.0"?>
<fleurInput fleurInputVersion="0.34">
  <comment>Fe Pt</comment>
  <calculationSetup>
    <cutoffs Kmax="4.0" Gmax="10.0" GmaxXC="8.7"/>
    <scfLoop itmax="9" minDistance=".00001"/>
    <magnetism jspins="2"/>
  </calculationSetup>
  <cell>
    <bzIntegration mode="hist">
      <kPointListSelection listName="default"/>
      <kPointLists>
        <kPointList name="default" count="1"><kPoint weight="1.0">0 0 0</kPoint></kPointList>
      </kPointLists>
    </bzIntegration>
  </cell>
  <atomSpecies>
    <species name="Fe-1" element="Fe" atomicNumber="26">
      <mtSphere radius="2.2" gridPoints="787" logIncrement=".016"/>
      <ldaU l="2" U="5.5" J="0.9" l_amf="F"/>
    </species>
    <species name="Pt-1" element="Pt" atomicNumber="78">
      <mtSphere radius="2.3" gridPoints="787" logIncrement=".016"/>
    </species>
    <species name="Fe-2" element="Fe" atomicNumber="26">
      <mtSphere radius="2.2" gridPoints="787" logIncrement=".016"/>
    </species>
  </atomSpecies>
  <atomGroups>
    <atomGroup species="Fe-1"><relPos label="                 222">1/2 1/2 0</relPos></atomGroup>
    <atomGroup species="Pt-1"><relPos label="                   1">0 0 0</relPos></atomGroup>
    <atomGroup species="Fe-2"><relPos label="                   3">0 1/2 1/2</relPos></atomGroup>
  </atomGroups>
</fleurInput>"#;

    fn schema() -> Arc<Schema> {
        BuiltinSchemas::new().unwrap().load("0.34").unwrap()
    }

    fn state() -> EditState {
        EditState::new(parse_xml("inp.xml", INP.as_bytes()).unwrap(), None).unwrap()
    }

    fn run(tasks: Vec<XmlTask>) -> Result<EditState> {
        run_with(tasks, &AuxNodes::new())
    }

    fn run_with(tasks: Vec<XmlTask>, nodes: &AuxNodes) -> Result<EditState> {
        let schema = schema();
        let mut state = state();
        Interpreter::new(&schema, nodes).apply_all(&mut state, &tasks)?;
        Ok(state)
    }

    fn attrs(state: &EditState, xpath: &str, name: &str) -> Vec<String> {
        XPath::parse(xpath)
            .unwrap()
            .select(&state.tree)
            .iter()
            .filter_map(|p| element_at(&state.tree, p))
            .filter_map(|e| e.attributes.get(name).cloned())
            .collect()
    }

    fn map(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap_or_default()
    }

    #[test]
    fn attribute_is_set_everywhere_by_default() {
        let state = run(vec![XmlTask::SetAttribValue(AttribEdit::new("radius", 2.5))]).unwrap();
        assert_eq!(attrs(&state, "//mtSphere", "radius"), vec!["2.5", "2.5", "2.5"]);
    }

    #[test]
    fn occurrences_select_matches_in_document_order() {
        let edit = AttribEdit::new("radius", 2.0).occurrences(vec![0, 2]);
        let state = run(vec![XmlTask::SetAttribValue(edit)]).unwrap();
        assert_eq!(attrs(&state, "//mtSphere", "radius"), vec!["2.0", "2.3", "2.0"]);
    }

    #[test]
    fn first_attrib_value_only_touches_the_first_match() {
        let state = run(vec![XmlTask::SetFirstAttribValue(AttribEdit::new("radius", 1.9))]).unwrap();
        assert_eq!(attrs(&state, "//mtSphere", "radius"), vec!["1.9", "2.3", "2.2"]);
    }

    #[test]
    fn list_values_must_match_the_targets() {
        let err = run(vec![XmlTask::SetAttribValue(AttribEdit::new("radius", json!([1.0, 2.0])))]).unwrap_err();
        assert!(matches!(err, FleurinpError::Argument(_)));
    }

    #[test]
    fn missing_targets_are_reported_or_created() {
        let err = run(vec![XmlTask::SetAttribValue(AttribEdit::new("ctail", false))]).unwrap_err();
        assert!(matches!(err, FleurinpError::PathNotFound { .. }));
        let state = run(vec![XmlTask::SetAttribValue(AttribEdit::new("ctail", false).create(true))]).unwrap();
        assert_eq!(attrs(&state, "//coreElectrons", "ctail"), vec!["F"]);
    }

    #[test]
    fn inpchanges_resolve_attributes_and_text() {
        let changes = [("itmax".to_string(), json!(99)), ("comment".to_string(), json!("edited"))]
            .into_iter()
            .collect();
        let state = run(vec![XmlTask::SetInpchanges(SetInpchanges { changes })]).unwrap();
        assert_eq!(attrs(&state, "//scfLoop", "itmax"), vec!["99"]);
        let comment = XPath::parse("/fleurInput/comment").unwrap().select(&state.tree);
        assert_eq!(text_of(element_at(&state.tree, &comment[0]).unwrap()).as_deref(), Some("edited"));

        let unknown = [("doesNotExist".to_string(), json!(1))].into_iter().collect();
        assert!(matches!(
            run(vec![XmlTask::SetInpchanges(SetInpchanges { changes: unknown })]),
            Err(FleurinpError::Argument(_))
        ));
    }

    #[test]
    fn species_selectors() {
        let edit = SpeciesEdit {
            species_name: "all-Fe".to_string(),
            changes: map(json!({"mtSphere": {"radius": 2.0}})),
            create: true,
        };
        let state = run(vec![XmlTask::SetSpecies(edit)]).unwrap();
        assert_eq!(attrs(&state, "//mtSphere", "radius"), vec!["2.0", "2.3", "2.0"]);

        let by_label = SpeciesLabelEdit {
            atom_label: "1".to_string(),
            changes: map(json!({"mtSphere": {"gridPoints": 925}})),
            create: true,
        };
        let state = run(vec![XmlTask::SetSpeciesLabel(by_label)]).unwrap();
        assert_eq!(attrs(&state, "//mtSphere", "gridPoints"), vec!["787", "925", "787"]);
    }

    #[test]
    fn cloned_species_follow_the_last_species() {
        let clone = CloneSpecies {
            species_name: "Pt-1".to_string(),
            new_name: "Pt-2".to_string(),
            changes: Some(map(json!({"mtSphere": {"radius": 2.4}}))),
        };
        let state = run(vec![XmlTask::CloneSpecies(clone.clone())]).unwrap();
        assert_eq!(attrs(&state, "//species", "name"), vec!["Fe-1", "Pt-1", "Fe-2", "Pt-2"]);
        assert_eq!(attrs(&state, "//mtSphere", "radius"), vec!["2.2", "2.3", "2.2", "2.4"]);

        let duplicate = run(vec![XmlTask::CloneSpecies(clone.clone()), XmlTask::CloneSpecies(clone)]);
        assert!(matches!(duplicate, Err(FleurinpError::Argument(_))));
    }

    #[test]
    fn atom_groups_by_position_species_and_label() {
        let by_position = AtomGroupEdit {
            changes: map(json!({"force": {"calculate": true, "relaxXYZ": "TTF"}})),
            position: Some(OneOrMany::One(2)),
            species: None,
        };
        let state = run(vec![XmlTask::SetAtomgroup(by_position)]).unwrap();
        assert_eq!(attrs(&state, "//atomGroup/force", "relaxXYZ"), vec!["TTF"]);

        let by_label = AtomGroupLabelEdit {
            atom_label: "222".to_string(),
            changes: map(json!({"species": "Fe-2"})),
        };
        let state = run(vec![XmlTask::SetAtomgroupLabel(by_label)]).unwrap();
        assert_eq!(attrs(&state, "//atomGroup", "species"), vec!["Fe-2", "Pt-1", "Fe-2"]);

        let neither = AtomGroupEdit {
            changes: Map::new(),
            position: None,
            species: None,
        };
        assert!(matches!(run(vec![XmlTask::SetAtomgroup(neither)]), Err(FleurinpError::Argument(_))));
    }

    #[test]
    fn tags_are_created_deleted_and_replaced() {
        let create = TagCreate {
            tag_name: "<lo type=\"SCLO\" l=\"1\" n=\"5\"/>".to_string(),
            contains: None,
            not_contains: None,
            occurrences: Some(OneOrMany::One(-1)),
            create_parents: false,
        };
        let delete = TagSelect {
            tag_name: "mtSphere".to_string(),
            contains: None,
            not_contains: None,
            occurrences: Some(OneOrMany::One(1)),
        };
        let replace = TagReplace {
            tag_name: "cutoffs".to_string(),
            element: "<cutoffs Kmax=\"4.5\" Gmax=\"13.5\" GmaxXC=\"11.2\"/>".to_string(),
            contains: None,
            not_contains: None,
            occurrences: None,
        };
        let state = run(vec![
            XmlTask::CreateTag(create),
            XmlTask::DeleteTag(delete),
            XmlTask::ReplaceTag(replace),
        ])
        .unwrap();
        assert_eq!(attrs(&state, "//species[@name='Fe-2']/lo", "type"), vec!["SCLO"]);
        assert_eq!(attrs(&state, "//mtSphere", "radius"), vec!["2.2", "2.2"]);
        assert_eq!(attrs(&state, "//cutoffs", "Kmax"), vec!["4.5"]);
        assert!(schema().validate(&state.tree).is_empty());
    }

    #[test]
    fn simple_and_complex_tags() {
        let simple = SimpleTagEdit {
            tag_name: "stateOccupation".to_string(),
            changes: OneOrMany::Many(vec![
                map(json!({"state": "(3d3/2)", "spinUp": 2.0, "spinDown": 1.0})),
                map(json!({"state": "(3d5/2)", "spinUp": 3.0, "spinDown": 0.0})),
            ]),
            contains: None,
            not_contains: None,
            create_parents: true,
        };
        let state = run(vec![XmlTask::SetSimpleTag(simple)]).unwrap();
        assert_eq!(attrs(&state, "//stateOccupation", "state").len(), 6);

        let complex = ComplexTagEdit {
            tag_name: "magnetism".to_string(),
            changes: map(json!({"jspins": 1, "qss": [0.0, 0.0, 0.1]})),
            contains: None,
            not_contains: None,
            create: true,
        };
        let state = run(vec![XmlTask::SetComplexTag(complex)]).unwrap();
        assert_eq!(attrs(&state, "//magnetism", "jspins"), vec!["1"]);
        let qss = XPath::parse("//magnetism/qss").unwrap().select(&state.tree);
        assert_eq!(text_of(element_at(&state.tree, &qss[0]).unwrap()).as_deref(), Some("0.0 0.0 0.1"));
    }

    #[test]
    fn xpath_tasks_do_not_create() {
        let missing = XPathAttrib {
            xpath: "/fleurInput/calculationSetup/soc".to_string(),
            name: "l_soc".to_string(),
            value: json!(true),
            occurrences: None,
        };
        assert!(matches!(
            run(vec![XmlTask::XmlSetAttribValueNoCreate(missing)]),
            Err(FleurinpError::PathNotFound { .. })
        ));

        let unsupported = XPathSelect {
            xpath: "//atomGroup[relPos[@label]]".to_string(),
            occurrences: None,
        };
        assert!(matches!(
            run(vec![XmlTask::XmlDeleteTag(unsupported)]),
            Err(FleurinpError::Argument(_))
        ));
    }

    #[test]
    fn xpath_edits_apply_in_order() {
        let tasks = vec![
            XmlTask::XmlSetAttribValueNoCreate(XPathAttrib {
                xpath: "//species[@element='Fe']".to_string(),
                name: "magMom".to_string(),
                value: json!([2.2, 2.1]),
                occurrences: None,
            }),
            XmlTask::XmlDeleteAtt(XPathAttribDelete {
                xpath: "//mtSphere".to_string(),
                name: "logIncrement".to_string(),
                occurrences: Some(OneOrMany::One(0)),
            }),
            XmlTask::XmlSetTextNoCreate(XPathText {
                xpath: "//relPos".to_string(),
                text: json!("0 0 1/4"),
                occurrences: Some(OneOrMany::Many(vec![1])),
            }),
            XmlTask::XmlCreateTag(XPathCreate {
                xpath: "/fleurInput/calculationSetup".to_string(),
                element: "<soc theta=\"0.0\" phi=\"0.0\" l_soc=\"T\"/>".to_string(),
                create_parents: false,
                occurrences: None,
            }),
            XmlTask::XmlReplaceTag(XPathReplace {
                xpath: "/fleurInput/comment".to_string(),
                element: "<comment>replaced</comment>".to_string(),
                occurrences: None,
            }),
        ];
        let state = run(tasks).unwrap();
        assert_eq!(attrs(&state, "//species", "magMom"), vec!["2.2", "2.1"]);
        assert_eq!(attrs(&state, "//mtSphere", "logIncrement"), vec![".016", ".016"]);
        let relpos = XPath::parse("//relPos").unwrap().select(&state.tree);
        assert_eq!(text_of(element_at(&state.tree, &relpos[1]).unwrap()).as_deref(), Some("0 0 1/4"));
        assert_eq!(attrs(&state, "/fleurInput/calculationSetup/soc", "l_soc"), vec!["T"]);
        let comment = XPath::parse("/fleurInput/comment").unwrap().select(&state.tree);
        assert_eq!(text_of(element_at(&state.tree, &comment[0]).unwrap()).as_deref(), Some("replaced"));
        assert!(schema().validate(&state.tree).is_empty());
    }

    #[test]
    fn shift_values() {
        let shift = ShiftValue {
            changes: [("itmax".to_string(), 2.0)].into_iter().collect(),
            mode: ShiftMode::Rel,
            contains: None,
            not_contains: None,
            occurrences: None,
        };
        let state = run(vec![XmlTask::ShiftValue(shift)]).unwrap();
        assert_eq!(attrs(&state, "//scfLoop", "itmax"), vec!["18"]);

        let by_label = ShiftValueSpeciesLabel {
            atom_label: "222".to_string(),
            name: "radius".to_string(),
            value: 0.1,
            mode: ShiftMode::Abs,
        };
        let state = run(vec![XmlTask::ShiftValueSpeciesLabel(by_label)]).unwrap();
        assert_eq!(attrs(&state, "//mtSphere", "radius"), vec!["2.3000000000", "2.3", "2.2"]);
    }

    #[test]
    fn named_kpoint_lists() {
        let kpoints = KpointsData::uniform(vec![[0.0; 3], [0.5, 0.0, 0.0]]).unwrap();
        let nodes = AuxNodes::from([("kpoints_1".to_string(), AuxNode::Kpoints(kpoints))]);
        let set = SetKpointsdata {
            node: "kpoints_1".to_string(),
            name: Some("path".to_string()),
            switch: true,
        };
        let state = run_with(vec![XmlTask::SetKpointsdata(set.clone())], &nodes).unwrap();
        assert_eq!(attrs(&state, "//kPointList", "name"), vec!["default", "path"]);
        assert_eq!(attrs(&state, "//kPointList", "count"), vec!["1", "2"]);
        assert_eq!(attrs(&state, "//kPointListSelection", "listName"), vec!["path"]);
        assert!(schema().validate(&state.tree).is_empty());

        let back = SwitchKpointset {
            list_name: "default".to_string(),
        };
        let state = run_with(vec![XmlTask::SetKpointsdata(set.clone()), XmlTask::SwitchKpointset(back)], &nodes).unwrap();
        assert_eq!(attrs(&state, "//kPointListSelection", "listName"), vec!["default"]);

        let missing = run(vec![XmlTask::SetKpointsdata(set)]);
        assert!(matches!(missing, Err(FleurinpError::MissingNode(_))));
        assert!(matches!(
            run(vec![XmlTask::SetNkpts(SetNkpts { count: 4, gamma: false })]),
            Err(FleurinpError::Argument(_))
        ));
    }

    #[test]
    fn density_matrix_is_created_on_demand() {
        let task = SetNmmpmat {
            species_name: "Fe-1".to_string(),
            orbital: 2,
            spin: 2,
            state_occupations: Some(vec![1.0, 1.0, 0.5, 0.5, 0.0]),
            denmat: None,
        };
        let state = run(vec![XmlTask::SetNmmpmat(task)]).unwrap();
        let lines = state.nmmp.clone().unwrap();
        assert_eq!(lines.len(), 28);
        assert!(lines[..14].iter().all(|l| !l.contains('1')));
        assert!(lines[14..].iter().any(|l| l.contains("1.0000000000000")));
        assert_eq!(state.nmmp_bytes().unwrap().iter().filter(|b| **b == b'\n').count(), 28);
    }

    #[test]
    fn side_channel_must_be_text() {
        let tree = parse_xml("inp.xml", INP.as_bytes()).unwrap();
        let err = EditState::new(tree.clone(), Some(&[0x30, 0xff, 0x0a][..])).unwrap_err();
        assert!(matches!(err, FleurinpError::InvalidInput(_)));

        let state = EditState::new(tree, Some(&b"0.0 0.0\n\n   \n1.0 0.0\n\n"[..])).unwrap();
        assert_eq!(state.nmmp.unwrap(), vec!["0.0 0.0", "1.0 0.0"]);
    }
}
