//! Testing utilities for the fleurinp workspace
//!
//! Input deck fixtures, store helpers and tree queries shared by the
//! integration tests.

#![allow(missing_docs)]

use fleurinp::{FleurinpData, INP_XML};
use fleurinp_artifact::{ArtifactStore, ContentHash};
use fleurinp_xml::xpath::element_at;
use fleurinp_xml::{text_of, BuiltinSchemas, Element, XPath};
use std::sync::Once;

/// Format 0.31 deck: one LDA+U species, spin polarized, three labelled atoms
pub const INP_031: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<fleurInput fleurInputVersion="0.31">
   <comment>
      A Fleur input generator calculation with aiida
   </comment>
   <calculationSetup>
      <cutoffs Kmax="4.00000000" Gmax="10.00000000" GmaxXC="8.70000000" numbands="0"/>
      <scfLoop itmax="9" minDistance=".00001000" maxIterBroyd="99" imix="Anderson" alpha=".05000000" precondParam="0.0" spinf="2.00000000"/>
      <coreElectrons ctail="T" frcor="F" kcrel="0" coretail_lmax="0"/>
      <magnetism jspins="2" l_noco="F" swsp="F" lflip="F"/>
      <soc theta=".00000000" phi=".00000000" l_soc="F" spav="F"/>
      <geometryOptimization l_f="F" forcealpha="1.00000000" forcemix="BFGS" epsdisp=".00001000" epsforce=".00001000"/>
      <ldaU l_linMix="F" mixParam=".050000" spinf="1.000000"/>
      <bzIntegration valenceElectrons="28.00000000" mode="hist" fermiSmearingEnergy=".00100000">
         <kPointCount count="20" gamma="F"/>
      </bzIntegration>
      <energyParameterLimits ellow="-.80000000" elup="1.00000000"/>
   </calculationSetup>
   <cell>
      <symmetryOperations>
         <symOp>
            <row-1>1 0 0 .0000000000</row-1>
            <row-2>0 1 0 .0000000000</row-2>
            <row-3>0 0 1 .0000000000</row-3>
         </symOp>
      </symmetryOperations>
      <bulkLattice scale="1.0000000000" latnam="any">
         <bravaisMatrix>
            <row-1>5.301179702900000 .000000000000000 .000000000000000</row-1>
            <row-2>.000000000000000 7.497000033000000 .000000000000000</row-2>
            <row-3>.000000000000000 .000000000000000 7.992850008800000</row-3>
         </bravaisMatrix>
      </bulkLattice>
   </cell>
   <xcFunctional name="vwn" relativisticCorrections="F"/>
   <atomSpecies>
      <species name="Fe-1" element="Fe" atomicNumber="26" coreStates="7" magMom="2.20000000" flipSpin="T">
         <mtSphere radius="2.20000000" gridPoints="787" logIncrement=".01600000"/>
         <atomicCutoffs lmax="10" lnonsphr="6"/>
         <energyParameters s="4" p="4" d="3" f="4"/>
         <ldaU l="2" U="5.5" J="0.9" l_amf="F"/>
         <lo type="SCLO" l="1" n="3" eDeriv="0"/>
      </species>
      <species name="Pt-1" element="Pt" atomicNumber="78" coreStates="19" magMom=".00000000" flipSpin="T">
         <mtSphere radius="2.20000000" gridPoints="787" logIncrement=".01700000"/>
         <atomicCutoffs lmax="10" lnonsphr="6"/>
         <energyParameters s="6" p="6" d="5" f="5"/>
      </species>
      <species name="Fe-2" element="Fe" atomicNumber="26" coreStates="7" magMom="-2.20000000" flipSpin="T">
         <mtSphere radius="2.20000000" gridPoints="787" logIncrement=".01600000"/>
         <atomicCutoffs lmax="10" lnonsphr="6"/>
         <energyParameters s="4" p="4" d="3" f="4"/>
      </species>
   </atomSpecies>
   <atomGroups>
      <atomGroup species="Fe-1">
         <relPos label="                 222">1.000/2.000 1.000/2.000 .0000000000</relPos>
         <force calculate="T" relaxXYZ="TTT"/>
      </atomGroup>
      <atomGroup species="Pt-1">
         <relPos label="                 111">.0000000000 .0000000000 .0000000000</relPos>
         <force calculate="T" relaxXYZ="TTT"/>
      </atomGroup>
      <atomGroup species="Fe-2">
         <relPos label="                 333">.0000000000 1.000/2.000 1.000/2.000</relPos>
         <force calculate="T" relaxXYZ="TTT"/>
      </atomGroup>
   </atomGroups>
   <output dos="F" band="F" vacdos="F" slice="F" mcd="F">
      <checks vchk="F" cdinf="F"/>
      <densityOfStates ndir="0" minEnergy="-.50000000" maxEnergy=".50000000" sigma=".01500000"/>
      <unfoldingBand unfoldBand="F" supercellX="1" supercellY="1" supercellZ="1"/>
   </output>
</fleurInput>
"#;

/// Format 0.34 deck with named k-point lists
pub const INP_034: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<fleurInput fleurInputVersion="0.34">
   <comment>
      Si bulk
   </comment>
   <calculationSetup>
      <cutoffs Kmax="3.50000000" Gmax="10.50000000" GmaxXC="8.70000000" numbands="0"/>
      <scfLoop itmax="15" minDistance=".00001000" maxIterBroyd="99" imix="Anderson" alpha=".05000000" precondParam="0.0" spinf="2.00000000"/>
      <coreElectrons ctail="F" frcor="F" kcrel="0" coretail_lmax="0"/>
      <magnetism jspins="1" l_noco="F" swsp="F" lflip="F"/>
      <energyParameterLimits ellow="-.80000000" elup="1.00000000"/>
   </calculationSetup>
   <cell>
      <bzIntegration valenceElectrons="8.00000000" mode="hist" fermiSmearingEnergy=".00100000">
         <kPointListSelection listName="default"/>
         <kPointLists>
            <kPointList name="default" count="2" type="mesh">
               <kPoint weight="0.5">0.0 0.0 0.0</kPoint>
               <kPoint weight="0.5">0.5 0.5 0.5</kPoint>
            </kPointList>
         </kPointLists>
      </bzIntegration>
      <bulkLattice scale="1.0000000000" latnam="any">
         <bravaisMatrix>
            <row-1>.000000000000000 5.167355275200000 5.167355275200000</row-1>
            <row-2>5.167355275200000 .000000000000000 5.167355275200000</row-2>
            <row-3>5.167355275200000 5.167355275200000 .000000000000000</row-3>
         </bravaisMatrix>
      </bulkLattice>
   </cell>
   <xcFunctional name="pbe" relativisticCorrections="F"/>
   <atomSpecies>
      <species name="Si-1" element="Si" atomicNumber="14" coreStates="2">
         <mtSphere radius="2.17000000" gridPoints="521" logIncrement=".02200000"/>
         <atomicCutoffs lmax="8" lnonsphr="6"/>
         <energyParameters s="3" p="3" d="3" f="4"/>
      </species>
   </atomSpecies>
   <atomGroups>
      <atomGroup species="Si-1">
         <relPos label="                   1">1/8 1/8 1/8</relPos>
         <relPos label="                   2">-1/8 -1/8 -1/8</relPos>
         <force calculate="T" relaxXYZ="TTT"/>
      </atomGroup>
   </atomGroups>
   <output dos="F" band="F"/>
</fleurInput>
"#;

/// Format 0.34 deck keeping symmetry, k-points and relaxation in included files
pub const INP_034_SPLIT: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<fleurInput fleurInputVersion="0.34">
   <calculationSetup>
      <cutoffs Kmax="3.50000000" Gmax="10.50000000" GmaxXC="8.70000000"/>
      <scfLoop itmax="15" minDistance=".00001000"/>
      <magnetism jspins="1"/>
   </calculationSetup>
   <cell>
      <bzIntegration valenceElectrons="8.00000000" mode="hist">
         <kPointListSelection listName="default"/>
         <xi:include xmlns:xi="http://www.w3.org/2001/XInclude" href="kpts.xml"/>
      </bzIntegration>
      <xi:include xmlns:xi="http://www.w3.org/2001/XInclude" href="sym.xml"/>
      <bulkLattice scale="1.0000000000">
         <bravaisMatrix>
            <row-1>.0 5.1673552752 5.1673552752</row-1>
            <row-2>5.1673552752 .0 5.1673552752</row-2>
            <row-3>5.1673552752 5.1673552752 .0</row-3>
         </bravaisMatrix>
      </bulkLattice>
   </cell>
   <atomSpecies>
      <species name="Si-1" element="Si" atomicNumber="14">
         <mtSphere radius="2.17000000" gridPoints="521" logIncrement=".02200000"/>
      </species>
   </atomSpecies>
   <atomGroups>
      <atomGroup species="Si-1">
         <relPos label="                   1">1/8 1/8 1/8</relPos>
      </atomGroup>
   </atomGroups>
   <xi:include xmlns:xi="http://www.w3.org/2001/XInclude" href="relax.xml"><xi:fallback/></xi:include>
</fleurInput>
"#;

pub const SYM_XML: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<symmetryOperations>
   <symOp>
      <row-1>1 0 0 .0000000000</row-1>
      <row-2>0 1 0 .0000000000</row-2>
      <row-3>0 0 1 .0000000000</row-3>
   </symOp>
</symmetryOperations>
"#;

pub const KPTS_XML: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<kPointLists>
   <kPointList name="default" count="1" type="mesh">
      <kPoint weight="1.0">0.0 0.0 0.0</kPoint>
   </kPointList>
</kPointLists>
"#;

pub const RELAX_XML: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<relaxation>
   <displacements>
      <displace atomtype="1">0.0 0.0 0.01</displace>
   </displacements>
</relaxation>
"#;

static TRACING: Once = Once::new();

/// Route `tracing` output of a test run through `RUST_LOG`
pub fn init_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

pub fn deck_031() -> FleurinpData {
    FleurinpData::new([(INP_XML, INP_031)]).unwrap()
}

pub fn deck_034() -> FleurinpData {
    FleurinpData::new([(INP_XML, INP_034)]).unwrap()
}

pub fn split_deck() -> FleurinpData {
    FleurinpData::new([
        (INP_XML, INP_034_SPLIT),
        ("sym.xml", SYM_XML),
        ("kpts.xml", KPTS_XML),
        ("relax.xml", RELAX_XML),
    ])
    .unwrap()
}

/// Insert a deck and return its hash
pub fn store_deck(store: &ArtifactStore, deck: FleurinpData) -> ContentHash {
    store.insert(deck.into_artifact().unwrap()).unwrap()
}

/// Fresh store holding one deck
pub fn store_with(deck: FleurinpData) -> (ArtifactStore, ContentHash) {
    let store = ArtifactStore::new();
    let hash = store_deck(&store, deck);
    (store, hash)
}

/// Stored deck under `hash`
pub fn fetch_deck(store: &ArtifactStore, hash: &ContentHash) -> FleurinpData {
    store.get::<fleurinp::FleurinpArtifact>(hash).unwrap().into_content()
}

/// Combined tree of a deck with includes inlined
pub fn combined_tree(deck: &FleurinpData) -> Element {
    let registry = BuiltinSchemas::new().unwrap();
    deck.load_xml(&registry, true).unwrap().tree
}

/// Values of attribute `name` on every element `xpath` selects
pub fn attrib_values(tree: &Element, xpath: &str, name: &str) -> Vec<String> {
    XPath::parse(xpath)
        .unwrap()
        .select(tree)
        .iter()
        .filter_map(|path| element_at(tree, path))
        .filter_map(|element| element.attributes.get(name).cloned())
        .collect()
}

/// Text of every element `xpath` selects
pub fn text_values(tree: &Element, xpath: &str) -> Vec<String> {
    XPath::parse(xpath)
        .unwrap()
        .select(tree)
        .iter()
        .filter_map(|path| element_at(tree, path))
        .filter_map(text_of)
        .collect()
}

/// Number of elements `xpath` selects
pub fn count_of(tree: &Element, xpath: &str) -> usize {
    XPath::parse(xpath).unwrap().select(tree).len()
}

/// Lines of the density matrix file of a deck
pub fn nmmp_lines(deck: &FleurinpData) -> Vec<String> {
    deck.file(fleurinp::NMMP_MAT)
        .map(|bytes| String::from_utf8_lossy(bytes).lines().map(str::to_string).collect())
        .unwrap_or_default()
}

/// Keyword map from a JSON object literal
pub fn kwargs(value: serde_json::Value) -> serde_json::Map<String, serde_json::Value> {
    match value {
        serde_json::Value::Object(map) => map,
        other => panic!("expected an object, got {other}"),
    }
}
