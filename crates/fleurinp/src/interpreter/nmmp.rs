//! Density matrix side channel (`n_mmp_mat`)
//!
//! The file holds one 7×7 complex matrix per spin and LDA+U entry, spin
//! major. Entries are enumerated atom group by atom group over the `ldaU`
//! tags of the group's species. Each matrix is written row-major as 98 reals,
//! seven per line, so a block is 14 lines. Orbitals with `l < 3` occupy the
//! centred `(2l+1)×(2l+1)` sub-matrix.

use super::select::{literal, node, select};
use super::species::{selector_matches, GROUP_PATH, SPECIES_PATH};
use super::{EditState, Interpreter};
use crate::error::{FleurinpError, Result};
use crate::task::SetNmmpmat;
use fleurinp_xml::{child_elements, Element};

/// Lines per matrix block
pub(crate) const BLOCK_LINES: usize = 14;

const DIM: usize = 7;
const PER_LINE: usize = 7;

/// One LDA+U entry: species name and orbital
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct LdauEntry {
    pub(crate) species: String,
    pub(crate) orbital: u32,
}

/// LDA+U entries in file order
pub(crate) fn ldau_entries(tree: &Element) -> Result<Vec<LdauEntry>> {
    let mut entries = Vec::new();
    for group in select(tree, GROUP_PATH)? {
        let Some(species) = node(tree, &group)?.attributes.get("species") else {
            continue;
        };
        let xpath = format!("{SPECIES_PATH}[@name={}]", literal(species)?);
        for found in select(tree, &xpath)?.into_iter().take(1) {
            for ldau in child_elements(node(tree, &found)?).filter(|e| e.name == "ldaU") {
                let orbital = ldau
                    .attributes
                    .get("l")
                    .and_then(|l| l.trim().parse().ok())
                    .ok_or_else(|| FleurinpError::argument(format!("ldaU of species '{species}' has no valid 'l'")))?;
                entries.push(LdauEntry {
                    species: species.clone(),
                    orbital,
                });
            }
        }
    }
    Ok(entries)
}

/// Number of spins declared by the deck (1 when not given)
pub(crate) fn spins(tree: &Element) -> Result<usize> {
    let magnetism = select(tree, "/fleurInput/calculationSetup/magnetism")?;
    let Some(path) = magnetism.first() else {
        return Ok(1);
    };
    match node(tree, path)?.attributes.get("jspins") {
        Some(value) => value
            .trim()
            .parse()
            .map_err(|_| FleurinpError::argument(format!("jspins '{value}' is not a number"))),
        None => Ok(1),
    }
}

/// Number of lines the side channel must have for this tree
pub(crate) fn expected_lines(tree: &Element) -> Result<usize> {
    Ok(spins(tree)? * ldau_entries(tree)?.len() * BLOCK_LINES)
}

/// Lines that carry matrix values; blank lines are never counted
pub(crate) fn data_lines(lines: &[String]) -> usize {
    lines.iter().filter(|l| !l.trim().is_empty()).count()
}

/// `Some(message)` if the side channel does not fit the tree
pub(crate) fn size_mismatch(tree: &Element, lines: &[String]) -> Result<Option<String>> {
    let expected = expected_lines(tree)?;
    let actual = data_lines(lines);
    Ok((actual != expected).then(|| {
        format!("density matrix has {actual} lines, the LDA+U setup requires {expected}")
    }))
}

fn format_line(values: &[f64]) -> String {
    values.iter().map(|v| format!("{v:>20.13}")).collect()
}

fn block_lines(matrix: &[[(f64, f64); DIM]; DIM]) -> Vec<String> {
    let reals: Vec<f64> = matrix
        .iter()
        .flat_map(|row| row.iter().flat_map(|(re, im)| [*re, *im]))
        .collect();
    reals.chunks(PER_LINE).map(format_line).collect()
}

fn zero_file(lines: usize) -> Vec<String> {
    vec![format_line(&[0.0; PER_LINE]); lines]
}

impl Interpreter<'_> {
    pub(super) fn set_nmmpmat(&self, state: &mut EditState, task: &SetNmmpmat) -> Result<()> {
        if task.orbital > 3 {
            return Err(FleurinpError::argument(format!("orbital {} is not in 0..=3", task.orbital)));
        }
        let spins = spins(&state.tree)?;
        if task.spin == 0 || task.spin as usize > spins {
            return Err(FleurinpError::argument(format!(
                "spin {} is not in 1..={spins}",
                task.spin
            )));
        }

        let entries = ldau_entries(&state.tree)?;
        let blocks: Vec<usize> = entries
            .iter()
            .enumerate()
            .filter(|(_, e)| e.orbital == task.orbital && selector_matches(&task.species_name, &e.species))
            .map(|(i, _)| (task.spin as usize - 1) * entries.len() + i)
            .collect();
        if blocks.is_empty() {
            return Err(FleurinpError::path_not_found(format!(
                "LDA+U entry l={} of species '{}'",
                task.orbital, task.species_name
            )));
        }

        let matrix = build_matrix(task)?;
        let expected = spins * entries.len() * BLOCK_LINES;
        let lines = state.nmmp.get_or_insert_with(|| {
            tracing::debug!(lines = expected, "creating zero density matrix");
            zero_file(expected)
        });
        let actual = data_lines(lines);
        if actual != expected {
            return Err(FleurinpError::argument(format!(
                "density matrix has {actual} lines, the LDA+U setup requires {expected}"
            )));
        }
        // block offsets index data lines only
        lines.retain(|l| !l.trim().is_empty());
        let block = block_lines(&matrix);
        for index in blocks {
            let start = index * BLOCK_LINES;
            lines[start..start + BLOCK_LINES].clone_from_slice(&block);
        }
        Ok(())
    }
}

fn build_matrix(task: &SetNmmpmat) -> Result<[[(f64, f64); DIM]; DIM]> {
    let size = 2 * task.orbital as usize + 1;
    let offset = 3 - task.orbital as usize;
    let mut matrix = [[(0.0, 0.0); DIM]; DIM];
    match (&task.state_occupations, &task.denmat) {
        (Some(occupations), None) => {
            if occupations.len() != size {
                return Err(FleurinpError::argument(format!(
                    "{} state occupations given for l={}, expected {size}",
                    occupations.len(),
                    task.orbital
                )));
            }
            for (i, occupation) in occupations.iter().enumerate() {
                matrix[offset + i][offset + i] = (*occupation, 0.0);
            }
        }
        (None, Some(denmat)) => {
            if denmat.len() != size || denmat.iter().any(|row| row.len() != size) {
                return Err(FleurinpError::argument(format!(
                    "density matrix for l={} must be {size}x{size}",
                    task.orbital
                )));
            }
            for (i, row) in denmat.iter().enumerate() {
                for (j, [re, im]) in row.iter().enumerate() {
                    matrix[offset + i][offset + j] = (*re, *im);
                }
            }
        }
        _ => {
            return Err(FleurinpError::argument(
                "exactly one of state_occupations and denmat must be given",
            ))
        }
    }
    Ok(matrix)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interpreter::AuxNodes;
    use fleurinp_xml::{parse_xml, BuiltinSchemas, SchemaRegistry};

    const INP: &str = r#"<fleurInput fleurInputVersion="0.31">
        <calculationSetup><magnetism jspins="2"/></calculationSetup>
        <atomSpecies>
            <species name="Fe-1" element="Fe" atomicNumber="26"><ldaU l="2" U="5.5" J="0.9" l_amf="F"/></species>
            <species name="Pt-1" element="Pt" atomicNumber="78"/>
        </atomSpecies>
        <atomGroups>
            <atomGroup species="Fe-1"><relPos>0 0 0</relPos></atomGroup>
            <atomGroup species="Pt-1"><relPos>1/2 1/2 1/2</relPos></atomGroup>
        </atomGroups>
    </fleurInput>"#;

    fn tree() -> Element {
        parse_xml("inp.xml", INP.as_bytes()).unwrap()
    }

    fn occupations(values: Vec<f64>) -> SetNmmpmat {
        SetNmmpmat {
            species_name: "Fe-1".to_string(),
            orbital: 2,
            spin: 1,
            state_occupations: Some(values),
            denmat: None,
        }
    }

    #[test]
    fn entries_follow_atom_groups() {
        let tree = tree();
        assert_eq!(
            ldau_entries(&tree).unwrap(),
            vec![LdauEntry {
                species: "Fe-1".to_string(),
                orbital: 2
            }]
        );
        assert_eq!(expected_lines(&tree).unwrap(), 28);
    }

    #[test]
    fn occupations_land_on_the_centred_diagonal() {
        let matrix = build_matrix(&occupations(vec![1.0; 5])).unwrap();
        assert_eq!(matrix[0][0], (0.0, 0.0));
        assert_eq!(matrix[1][1], (1.0, 0.0));
        assert_eq!(matrix[5][5], (1.0, 0.0));
        assert_eq!(matrix[6][6], (0.0, 0.0));
    }

    #[test]
    fn shapes_are_checked() {
        assert!(build_matrix(&occupations(vec![1.0; 3])).is_err());
        let mut both = occupations(vec![1.0; 5]);
        both.denmat = Some(vec![vec![[0.0, 0.0]; 5]; 5]);
        assert!(build_matrix(&both).is_err());
    }

    #[test]
    fn lines_hold_seven_fixed_width_values() {
        let line = format_line(&[0.0; PER_LINE]);
        assert_eq!(line.len(), 7 * 20);
        assert_eq!(block_lines(&[[(0.0, 0.0); DIM]; DIM]).len(), BLOCK_LINES);
    }

    #[test]
    fn mismatched_files_are_reported() {
        let tree = tree();
        assert!(size_mismatch(&tree, &zero_file(28)).unwrap().is_none());
        assert!(size_mismatch(&tree, &zero_file(14)).unwrap().is_some());
    }

    #[test]
    fn blank_lines_count_the_same_for_edits_and_the_gate() {
        let schema = BuiltinSchemas::new().unwrap().load("0.31").unwrap();
        let nodes = AuxNodes::new();
        let mut lines = zero_file(28);
        lines.insert(14, String::new());
        lines.insert(3, "   ".to_string());
        assert!(size_mismatch(&tree(), &lines).unwrap().is_none());

        let mut state = EditState {
            tree: tree(),
            nmmp: Some(lines),
        };
        Interpreter::new(&schema, &nodes)
            .set_nmmpmat(&mut state, &occupations(vec![1.0; 5]))
            .unwrap();
        let lines = state.nmmp.unwrap();
        assert_eq!(lines.len(), 28);
        assert!(lines[..14].iter().any(|l| l.contains('1')));
        assert!(lines[14..].iter().all(|l| !l.contains('1')));
    }
}
