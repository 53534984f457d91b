#![allow(dead_code)]

use std::fs::File;
use std::io::Write;
use std::path::Path;
use zip::write::SimpleFileOptions;

pub const BALANCE_SHEET_ROLE: &str = "http://example.com/role/BalanceSheet";
pub const PARENT_CHILD: &str = "http://www.xbrl.org/2003/arcrole/parent-child";

pub const SCHEMA: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema"
    xmlns:xbrli="http://www.xbrl.org/2003/instance"
    xmlns:xbrldt="http://xbrl.org/2005/xbrldt"
    xmlns:link="http://www.xbrl.org/2003/linkbase"
    xmlns:xlink="http://www.w3.org/1999/xlink"
    xmlns:ex="urn:ex" targetNamespace="urn:ex" elementFormDefault="qualified">
  <xs:annotation>
    <xs:appinfo>
      <link:roleType roleURI="http://example.com/role/BalanceSheet" id="BalanceSheet">
        <link:definition>0001 - Statement - Balance Sheet</link:definition>
        <link:usedOn>link:presentationLink</link:usedOn>
      </link:roleType>
      <link:linkbaseRef xlink:type="simple" xlink:href="ex_pre.xml"
          xlink:role="http://www.xbrl.org/2003/role/presentationLinkbaseRef"
          xlink:arcrole="http://www.w3.org/1999/xlink/properties/linkbase"/>
      <link:linkbaseRef xlink:type="simple" xlink:href="ex_lab.xml"
          xlink:role="http://www.xbrl.org/2003/role/labelLinkbaseRef"
          xlink:arcrole="http://www.w3.org/1999/xlink/properties/linkbase"/>
    </xs:appinfo>
  </xs:annotation>
  <xs:include schemaLocation="ex.xsd"/>
  <xs:import namespace="urn:ex:types" schemaLocation="types.xsd"/>
  <xs:element id="ex_Assets" name="Assets" type="xbrli:monetaryItemType" substitutionGroup="xbrli:item" xbrli:periodType="instant" xbrli:balance="debit" nillable="true"/>
  <xs:element id="ex_Cash" name="Cash" type="xbrli:monetaryItemType" substitutionGroup="xbrli:item" xbrli:periodType="instant" xbrli:balance="debit"/>
  <xs:element id="ex_Receivables" name="Receivables" type="xbrli:monetaryItemType" substitutionGroup="xbrli:item" xbrli:periodType="instant" xbrli:balance="debit"/>
  <xs:element id="ex_Inventory" name="Inventory" type="xbrli:monetaryItemType" substitutionGroup="xbrli:item" xbrli:periodType="instant" xbrli:balance="debit"/>
  <xs:element id="ex_RegionAxis" name="RegionAxis" type="xbrli:stringItemType" substitutionGroup="xbrldt:dimensionItem" abstract="true" xbrli:periodType="duration"/>
  <xs:element id="ex_EuropeMember" name="EuropeMember" type="xbrli:stringItemType" substitutionGroup="xbrli:item" abstract="true" xbrli:periodType="duration"/>
</xs:schema>
"#;

/// Imports the main schema back.
pub const TYPES: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema" targetNamespace="urn:ex:types">
  <xs:import namespace="urn:ex" schemaLocation="ex.xsd"/>
</xs:schema>
"#;

pub const PRESENTATION: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<link:linkbase xmlns:link="http://www.xbrl.org/2003/linkbase" xmlns:xlink="http://www.w3.org/1999/xlink">
  <link:roleRef roleURI="http://example.com/role/BalanceSheet" xlink:type="simple" xlink:href="ex.xsd#BalanceSheet"/>
  <link:presentationLink xlink:type="extended" xlink:role="http://example.com/role/BalanceSheet">
    <link:loc xlink:type="locator" xlink:href="ex.xsd#ex_Assets" xlink:label="loc_Assets"/>
    <link:loc xlink:type="locator" xlink:href="ex.xsd#ex_Receivables" xlink:label="loc_Receivables"/>
    <link:loc xlink:type="locator" xlink:href="ex.xsd#ex_Cash" xlink:label="loc_Cash"/>
    <link:loc xlink:type="locator" xlink:href="ex.xsd#element(ex_Inventory)" xlink:label="loc_Inventory"/>
    <link:presentationArc xlink:type="arc" xlink:arcrole="http://www.xbrl.org/2003/arcrole/parent-child" xlink:from="loc_Assets" xlink:to="loc_Receivables"/>
    <link:presentationArc xlink:type="arc" xlink:arcrole="http://www.xbrl.org/2003/arcrole/parent-child" xlink:from="loc_Assets" xlink:to="loc_Cash"/>
    <link:presentationArc xlink:type="arc" xlink:arcrole="http://www.xbrl.org/2003/arcrole/parent-child" xlink:from="loc_Assets" xlink:to="loc_Inventory" order="0.5"/>
  </link:presentationLink>
</link:linkbase>
"#;

pub const LABELS: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<link:linkbase xmlns:link="http://www.xbrl.org/2003/linkbase" xmlns:xlink="http://www.w3.org/1999/xlink">
  <link:labelLink xlink:type="extended" xlink:role="http://www.xbrl.org/2003/role/link">
    <link:loc xlink:type="locator" xlink:href="ex.xsd#ex_Assets" xlink:label="loc_Assets"/>
    <link:label xlink:type="resource" xlink:label="lab_Assets" xlink:role="http://www.xbrl.org/2003/role/label" xml:lang="en-US">Assets</link:label>
    <link:label xlink:type="resource" xlink:label="lab_Assets" xlink:role="http://www.xbrl.org/2003/role/terseLabel" xml:lang="en-US">Total assets</link:label>
    <link:labelArc xlink:type="arc" xlink:arcrole="http://www.xbrl.org/2003/arcrole/concept-label" xlink:from="loc_Assets" xlink:to="lab_Assets"/>
  </link:labelLink>
</link:linkbase>
"#;

pub const CONTEXTS: &str = r#"  <xbrli:context id="FY2023">
    <xbrli:entity><xbrli:identifier scheme="http://www.sec.gov/CIK">0000123456</xbrli:identifier></xbrli:entity>
    <xbrli:period><xbrli:instant>2023-12-31</xbrli:instant></xbrli:period>
  </xbrli:context>
  <xbrli:context id="FY2023_copy">
    <xbrli:entity><xbrli:identifier scheme="http://www.sec.gov/CIK">0000123456</xbrli:identifier></xbrli:entity>
    <xbrli:period><xbrli:instant>2023-12-31</xbrli:instant></xbrli:period>
  </xbrli:context>
  <xbrli:context id="FY2023_EU">
    <xbrli:entity>
      <xbrli:identifier scheme="http://www.sec.gov/CIK">0000123456</xbrli:identifier>
      <xbrli:segment><xbrldi:explicitMember dimension="ex:RegionAxis">ex:EuropeMember</xbrldi:explicitMember></xbrli:segment>
    </xbrli:entity>
    <xbrli:period><xbrli:instant>2023-12-31</xbrli:instant></xbrli:period>
  </xbrli:context>
  <xbrli:unit id="USD"><xbrli:measure>iso4217:USD</xbrli:measure></xbrli:unit>
"#;

pub const FACTS: &str = r##"  <ex:Assets id="f1" contextRef="FY2023" unitRef="USD" decimals="-3">1000000</ex:Assets>
  <ex:Cash contextRef="FY2023_copy" unitRef="USD" decimals="-3">400000</ex:Cash>
  <ex:Receivables contextRef="FY2023_EU" unitRef="USD" decimals="-3">600000</ex:Receivables>
  <link:footnoteLink xlink:type="extended" xlink:role="http://www.xbrl.org/2003/role/link">
    <link:loc xlink:type="locator" xlink:href="#f1" xlink:label="fact_f1"/>
    <link:footnote xlink:type="resource" xlink:label="fn_1" xlink:role="http://www.xbrl.org/2003/role/footnote" xml:lang="en-US">Includes restricted cash.</link:footnote>
    <link:footnoteArc xlink:type="arc" xlink:arcrole="http://www.xbrl.org/2003/arcrole/fact-footnote" xlink:from="fact_f1" xlink:to="fn_1"/>
  </link:footnoteLink>
"##;

pub fn instance(contexts: &str, facts: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<xbrli:xbrl xmlns:xbrli="http://www.xbrl.org/2003/instance"
    xmlns:link="http://www.xbrl.org/2003/linkbase"
    xmlns:xlink="http://www.w3.org/1999/xlink"
    xmlns:xbrldi="http://xbrl.org/2006/xbrldi"
    xmlns:iso4217="http://www.xbrl.org/2003/iso4217"
    xmlns:ex="urn:ex">
  <link:schemaRef xlink:type="simple" xlink:href="ex.xsd"/>
{}{}</xbrli:xbrl>
"#,
        contexts, facts
    )
}

pub fn standard_instance() -> String {
    instance(CONTEXTS, FACTS)
}

fn files(instance: &str) -> Vec<(&'static str, String)> {
    vec![
        ("ex.xml", instance.to_string()),
        ("ex.xsd", SCHEMA.to_string()),
        ("types.xsd", TYPES.to_string()),
        ("ex_pre.xml", PRESENTATION.to_string()),
        ("ex_lab.xml", LABELS.to_string()),
    ]
}

/// Writes the filing as loose files in `dir`.
pub fn write_folder(dir: &Path, instance: &str) {
    write_folder_with(dir, instance, &[]);
}

/// Like [`write_folder`], with some documents replaced by name.
pub fn write_folder_with(dir: &Path, instance: &str, replaced: &[(&str, &str)]) {
    for (name, content) in files(instance) {
        let content = replaced
            .iter()
            .find(|(n, _)| *n == name)
            .map(|(_, c)| c.to_string())
            .unwrap_or(content);
        std::fs::write(dir.join(name), content).unwrap();
    }
}

/// Writes the same filing into a zip archive, under a `filing/` directory.
pub fn write_archive(path: &Path, instance: &str) {
    let mut writer = zip::ZipWriter::new(File::create(path).unwrap());
    writer
        .add_directory("filing/", SimpleFileOptions::default())
        .unwrap();
    for (name, content) in files(instance) {
        writer
            .start_file(format!("filing/{}", name), SimpleFileOptions::default())
            .unwrap();
        writer.write_all(content.as_bytes()).unwrap();
    }
    writer.finish().unwrap();
}
