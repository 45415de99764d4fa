// Zufaellige XML-Baeume fuer Property-Tests (proptest).
//
// Wird per `include!` eingebunden. Benötigt:
//   use proptest::prelude::*;
//   use std::collections::BTreeMap;

#[derive(Debug, Clone)]
enum Node {
    Element {
        prefix: Option<&'static str>,
        name: &'static str,
        attrs: BTreeMap<&'static str, String>,
        children: Vec<Node>,
    },
    Text(String),
    Comment(String),
}

fn element_name() -> impl Strategy<Value = &'static str> {
    prop::sample::select(vec!["a", "b", "item", "list"])
}

fn prefix() -> impl Strategy<Value = Option<&'static str>> {
    prop::option::weighted(0.3, prop::sample::select(vec!["p", "q"]))
}

fn attrs() -> impl Strategy<Value = BTreeMap<&'static str, String>> {
    prop::collection::btree_map(prop::sample::select(vec!["id", "k", "v"]), "[a-z&<\"' \t\n\r]{0,4}", 0..2)
}

fn text() -> impl Strategy<Value = String> {
    prop_oneof![
        "[a-z&<> \r]{1,6}",
        prop::sample::select(vec![" ", "\n", "\n  ", "\t", "\r\n"]).prop_map(String::from),
    ]
}

fn node() -> impl Strategy<Value = Node> {
    let leaf = prop_oneof![
        3 => text().prop_map(Node::Text),
        1 => "[a-z ]{0,5}".prop_map(Node::Comment),
    ];
    leaf.prop_recursive(4, 40, 4, |inner| {
        (prefix(), element_name(), attrs(), prop::collection::vec(inner, 0..4))
            .prop_map(|(prefix, name, attrs, children)| Node::Element { prefix, name, attrs, children })
    })
}

/// Ein Dokument: immer genau ein Wurzelelement.
fn document() -> impl Strategy<Value = Node> {
    (prefix(), element_name(), attrs(), prop::collection::vec(node(), 0..5))
        .prop_map(|(prefix, name, attrs, children)| Node::Element { prefix, name, attrs, children })
}

fn escape(s: &str, attr: bool) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' if attr => out.push_str("&quot;"),
            '\r' => out.push_str("&#13;"),
            '\n' if attr => out.push_str("&#10;"),
            '\t' if attr => out.push_str("&#9;"),
            _ => out.push(c),
        }
    }
    out
}

/// Serialisiert den Baum; ein Prefix wird nur deklariert, wenn kein Vorfahre
/// ihn schon gebunden hat.
fn render(node: &Node) -> String {
    fn walk(node: &Node, declared: &mut Vec<&'static str>, out: &mut String) {
        match node {
            Node::Text(t) => out.push_str(&escape(t, false)),
            Node::Comment(c) => {
                out.push_str("<!--");
                out.push_str(c);
                out.push_str("-->");
            }
            Node::Element { prefix, name, attrs, children } => {
                let qname = match prefix {
                    Some(p) => format!("{p}:{name}"),
                    None => name.to_string(),
                };
                out.push('<');
                out.push_str(&qname);
                for (k, v) in attrs {
                    out.push_str(&format!(" {k}=\"{}\"", escape(v, true)));
                }
                let new_decl = prefix.filter(|p| !declared.contains(p));
                if let Some(p) = new_decl {
                    out.push_str(&format!(" xmlns:{p}=\"urn:{p}\""));
                    declared.push(p);
                }
                if children.is_empty() {
                    out.push_str("/>");
                } else {
                    out.push('>');
                    for child in children {
                        walk(child, declared, out);
                    }
                    out.push_str(&format!("</{qname}>"));
                }
                if new_decl.is_some() {
                    declared.pop();
                }
            }
        }
    }
    let mut out = String::new();
    walk(node, &mut Vec::new(), &mut out);
    out
}
