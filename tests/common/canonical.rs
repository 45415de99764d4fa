// Kanonische Baumdarstellung ueber roxmltree, unabhaengig vom eigenen Parser.
//
// Wird per `include!` eingebunden. Benötigt die Dev-Dependency `roxmltree`.

/// Kanonischer Text eines Dokuments.
///
/// Normalisierungen:
/// - Elemente und Attribute als `{uri}local` (Prefixe spielen keine Rolle)
/// - Attribute lexikographisch sortiert
/// - Namespace-Deklarationen nicht enthalten
fn canonical(xml: &str) -> String {
    let doc = roxmltree::Document::parse(xml).unwrap_or_else(|e| panic!("roxmltree: {e}\n{xml}"));
    let mut out = String::new();
    canonical_node(doc.root_element(), &mut out);
    out
}

fn canonical_node(node: roxmltree::Node<'_, '_>, out: &mut String) {
    match node.node_type() {
        roxmltree::NodeType::Element => {
            let tag = node.tag_name();
            out.push('<');
            out.push_str(&expanded(tag.namespace(), tag.name()));
            let mut attrs: Vec<(String, &str)> = node
                .attributes()
                .map(|a| (expanded(a.namespace(), a.name()), a.value()))
                .collect();
            attrs.sort();
            for (name, value) in attrs {
                out.push_str(&format!(" {name}={value:?}"));
            }
            out.push('>');
            for child in node.children() {
                canonical_node(child, out);
            }
            out.push_str("</>");
        }
        roxmltree::NodeType::Text => out.push_str(&format!("T{:?}", node.text().unwrap_or(""))),
        roxmltree::NodeType::Comment => out.push_str(&format!("C{:?}", node.text().unwrap_or(""))),
        roxmltree::NodeType::PI => {
            if let Some(pi) = node.pi() {
                out.push_str(&format!("P{:?}{:?}", pi.target, pi.value.unwrap_or("")));
            }
        }
        roxmltree::NodeType::Root => {}
    }
}

fn expanded(namespace: Option<&str>, name: &str) -> String {
    match namespace {
        Some(ns) if !ns.is_empty() => format!("{{{ns}}}{name}"),
        _ => name.to_string(),
    }
}
