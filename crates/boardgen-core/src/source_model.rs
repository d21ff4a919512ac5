//! Lightweight connectivity model over tscircuit source text.
//!
//! This is not a JSX parser. It scans self-closing elements and their
//! attributes, which is all the transforms and the iteration diff need.
//! Unknown constructs pass through untouched.

use std::collections::BTreeMap;
use std::sync::OnceLock;

use regex::Regex;

fn element_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"<([a-zA-Z][\w]*)\b([^<>]*?)/?>").expect("element regex"))
}

fn attr_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"([A-Za-z_][\w-]*)\s*=\s*(?:"([^"]*)"|\{([^{}]*(?:\{[^{}]*\}[^{}]*)*)\})"#)
            .expect("attr regex")
    })
}

fn connection_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"(\w+)\s*:\s*"net\.(\w+)""#).expect("connection regex"))
}

/// Board outline dimensions in millimetres.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoardShape {
    pub width: f64,
    pub height: f64,
}

/// A placed component with its PCB coordinates (centre-origin).
#[derive(Debug, Clone, PartialEq)]
pub struct ComponentNode {
    pub kind: String,
    pub name: String,
    pub value: Option<String>,
    pub pcb_x: Option<f64>,
    pub pcb_y: Option<f64>,
}

/// A `<trace>` element's endpoints as written.
#[derive(Debug, Clone, PartialEq)]
pub struct TraceNode {
    pub from: Option<String>,
    pub to: Option<String>,
}

/// Parsed view of a circuit source document.
#[derive(Debug, Clone, Default)]
pub struct SourceModel {
    pub board: Option<BoardShape>,
    pub components: Vec<ComponentNode>,
    pub traces: Vec<TraceNode>,
    pub nets: Vec<String>,
    /// pin selector -> net name, gathered from traces and `connections` props.
    pub net_bindings: Vec<(String, String)>,
}

/// Parse a numeric attribute, tolerating a `mm` suffix and JSX braces.
pub fn parse_mm(raw: &str) -> Option<f64> {
    raw.trim().trim_end_matches("mm").trim().parse::<f64>().ok()
}

/// Whether a selector is a pin reference of the form `.Ref > .Pin`.
pub fn is_pin_selector(selector: &str) -> bool {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| {
        Regex::new(r"^\.[A-Za-z][\w]*\s*>\s*\.[\w]+$").expect("pin selector regex")
    });
    re.is_match(selector.trim())
}

/// Whether a selector is a net reference of the form `net.Name`.
pub fn is_net_selector(selector: &str) -> bool {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| Regex::new(r"^net\.[\w]+$").expect("net selector regex"));
    re.is_match(selector.trim())
}

/// Extract the net name from a `net.Name` selector.
pub fn net_name(selector: &str) -> Option<&str> {
    selector.trim().strip_prefix("net.").filter(|n| !n.is_empty())
}

impl SourceModel {
    pub fn parse(code: &str) -> Self {
        let mut model = SourceModel::default();

        for caps in element_re().captures_iter(code) {
            let tag = &caps[1];
            let attr_text = caps.get(2).map(|m| m.as_str()).unwrap_or("");
            let attrs = parse_attrs(attr_text);

            match tag {
                "board" => {
                    let width = attrs.get("width").and_then(|v| parse_mm(v));
                    let height = attrs.get("height").and_then(|v| parse_mm(v));
                    if let (Some(width), Some(height)) = (width, height) {
                        model.board = Some(BoardShape { width, height });
                    }
                }
                "trace" => {
                    let from = attrs.get("from").cloned();
                    let to = attrs.get("to").cloned();
                    if let (Some(from), Some(to)) = (&from, &to) {
                        record_trace_binding(&mut model.net_bindings, from, to);
                    }
                    model.traces.push(TraceNode { from, to });
                }
                "net" => {
                    if let Some(name) = attrs.get("name") {
                        model.nets.push(name.clone());
                    }
                }
                _ => {
                    if let Some(name) = attrs.get("name") {
                        if let Some(connections) = attrs.get("connections") {
                            for conn in connection_re().captures_iter(connections) {
                                model
                                    .net_bindings
                                    .push((format!(".{} > .{}", name, &conn[1]), conn[2].to_string()));
                            }
                        }
                        model.components.push(ComponentNode {
                            kind: tag.to_string(),
                            name: name.clone(),
                            value: attrs.get("value").cloned(),
                            pcb_x: attrs.get("pcbX").and_then(|v| parse_mm(v)),
                            pcb_y: attrs.get("pcbY").and_then(|v| parse_mm(v)),
                        });
                    }
                }
            }
        }
        model
    }

    /// Net name -> ordered pin endpoints, deterministic across runs.
    pub fn endpoints_by_net(&self) -> BTreeMap<String, Vec<String>> {
        let mut by_net: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for (pin, net) in &self.net_bindings {
            let endpoints = by_net.entry(net.clone()).or_default();
            if !endpoints.contains(pin) {
                endpoints.push(pin.clone());
            }
        }
        for endpoints in by_net.values_mut() {
            endpoints.sort();
        }
        by_net
    }

    pub fn component(&self, name: &str) -> Option<&ComponentNode> {
        self.components.iter().find(|c| c.name == name)
    }
}

fn record_trace_binding(bindings: &mut Vec<(String, String)>, from: &str, to: &str) {
    let (pin, net) = if is_pin_selector(from) && is_net_selector(to) {
        (from, to)
    } else if is_net_selector(from) && is_pin_selector(to) {
        (to, from)
    } else {
        return;
    };
    if let Some(net) = net_name(net) {
        bindings.push((pin.trim().to_string(), net.to_string()));
    }
}

fn parse_attrs(attr_text: &str) -> BTreeMap<String, String> {
    attr_re()
        .captures_iter(attr_text)
        .map(|caps| {
            let key = caps[1].to_string();
            let value = caps
                .get(2)
                .or_else(|| caps.get(3))
                .map(|m| m.as_str().trim().to_string())
                .unwrap_or_default();
            (key, value)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
export default () => (
  <board width="60mm" height={40}>
    <resistor name="R1" resistance="10k" value="10k" pcbX={5} pcbY={-3} />
    <capacitor name="C1" value="100nF" pcbX={-8} pcbY={2.5} />
    <chip name="U1" connections={{ pin1: "net.VCC", pin2: "net.GND" }} />
    <net name="VCC" />
    <trace from=".R1 > .pin1" to="net.VCC" />
    <trace from="net.GND" to=".C1 > .neg" />
  </board>
)
"#;

    #[test]
    fn test_parse_board_and_components() {
        let model = SourceModel::parse(SAMPLE);
        let board = model.board.expect("board parsed");
        assert_eq!(board.width, 60.0);
        assert_eq!(board.height, 40.0);

        assert_eq!(model.components.len(), 3);
        let r1 = model.component("R1").expect("R1");
        assert_eq!(r1.kind, "resistor");
        assert_eq!(r1.pcb_x, Some(5.0));
        assert_eq!(r1.pcb_y, Some(-3.0));
        assert_eq!(r1.value.as_deref(), Some("10k"));
    }

    #[test]
    fn test_parse_traces_and_bindings() {
        let model = SourceModel::parse(SAMPLE);
        assert_eq!(model.traces.len(), 2);
        assert_eq!(model.nets, vec!["VCC".to_string()]);

        let by_net = model.endpoints_by_net();
        assert_eq!(by_net["VCC"], vec![".R1 > .pin1", ".U1 > .pin1"]);
        assert_eq!(by_net["GND"], vec![".C1 > .neg", ".U1 > .pin2"]);
    }

    #[test]
    fn test_selector_predicates() {
        assert!(is_pin_selector(".R1 > .pin1"));
        assert!(is_pin_selector(".U10 > .VIN"));
        assert!(!is_pin_selector("R1 > pin1"));
        assert!(!is_pin_selector(".R1"));

        assert!(is_net_selector("net.VCC"));
        assert!(!is_net_selector("net."));
        assert!(!is_net_selector(".R1 > .pin1"));

        assert_eq!(net_name("net.GND"), Some("GND"));
        assert_eq!(net_name("net."), None);
    }

    #[test]
    fn test_parse_mm_variants() {
        assert_eq!(parse_mm("60mm"), Some(60.0));
        assert_eq!(parse_mm(" 12.5 "), Some(12.5));
        assert_eq!(parse_mm("-3"), Some(-3.0));
        assert_eq!(parse_mm("wide"), None);
    }
}
