//! Service discovery data for ad-hoc commands (XEP-0030 / XEP-0050 §2)

use std::collections::BTreeSet;

use super::registry::CommandRegistry;
use crate::Jid;
use crate::roster::GroupLookup;
use crate::stanza::{Element, IqHeader, NS_COMMANDS, NS_DISCO_INFO, NS_DISCO_ITEMS};

/// One entry of the command list
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoItem {
    pub jid: Jid,
    pub node: String,
    pub name: String,
}

impl DiscoItem {
    /// Encode as `<item/>`
    #[must_use]
    pub fn to_element(&self) -> Element {
        Element::new("item")
            .attr_set("jid", self.jid.to_string())
            .attr_set("node", self.node.as_str())
            .attr_set("name", self.name.as_str())
    }
}

/// Disco identity
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoIdentity {
    pub category: String,
    pub kind: String,
    pub name: Option<String>,
}

impl DiscoIdentity {
    fn automation(kind: &str, name: Option<&str>) -> Self {
        Self {
            category: "automation".to_string(),
            kind: kind.to_string(),
            name: name.map(ToString::to_string),
        }
    }
}

/// Identities and features of one disco node
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoInfo {
    pub identities: Vec<DiscoIdentity>,
    pub features: Vec<String>,
}

impl DiscoInfo {
    /// Encode as a disco#info `<query/>` for `node`
    #[must_use]
    pub fn to_element(&self, node: &str) -> Element {
        let mut query = Element::with_ns("query", NS_DISCO_INFO).attr_set("node", node);
        for identity in &self.identities {
            let mut el = Element::new("identity")
                .attr_set("category", identity.category.as_str())
                .attr_set("type", identity.kind.as_str());
            if let Some(name) = &identity.name {
                el.set_attr("name", name.as_str());
            }
            query.push_child(el);
        }
        for feature in &self.features {
            query.push_child(Element::new("feature").attr_set("var", feature.as_str()));
        }
        query
    }
}

/// Features advertised for `owner`: the commands namespace plus every
/// payload feature of its commands, deduplicated
#[must_use]
pub fn features(registry: &CommandRegistry, owner: &Jid) -> Vec<String> {
    let extra: BTreeSet<String> = registry
        .list(owner)
        .iter()
        .flat_map(|def| def.features().iter().cloned())
        .filter(|f| f != NS_COMMANDS)
        .collect();

    std::iter::once(NS_COMMANDS.to_string()).chain(extra).collect()
}

/// Commands of `owner` that `requestor` may currently run
#[must_use]
pub fn items(
    registry: &CommandRegistry,
    groups: &dyn GroupLookup,
    owner: &Jid,
    requestor: &Jid,
) -> Vec<DiscoItem> {
    registry
        .list(owner)
        .iter()
        .filter(|def| def.is_authorized(requestor, groups))
        .map(|def| DiscoItem {
            jid: owner.clone(),
            node: def.node().to_string(),
            name: def.label().to_string(),
        })
        .collect()
}

/// Info for the command list node or a single command node
///
/// Returns `None` for unknown nodes and for commands the requestor may not
/// run, so their existence is not disclosed.
#[must_use]
pub fn info(
    registry: &CommandRegistry,
    groups: &dyn GroupLookup,
    owner: &Jid,
    requestor: &Jid,
    node: &str,
) -> Option<DiscoInfo> {
    if node == NS_COMMANDS {
        return registry.has_commands(owner).then(|| DiscoInfo {
            identities: vec![DiscoIdentity::automation("command-list", Some("Commands"))],
            features: vec![NS_DISCO_ITEMS.to_string(), NS_COMMANDS.to_string()],
        });
    }

    let def = registry.lookup(owner, node).ok()?;
    if !def.is_authorized(requestor, groups) {
        return None;
    }

    let mut features = vec![NS_DISCO_INFO.to_string(), NS_COMMANDS.to_string()];
    features.extend(def.features().iter().filter(|f| *f != NS_COMMANDS).cloned());
    Some(DiscoInfo {
        identities: vec![DiscoIdentity::automation("command-node", Some(def.label()))],
        features,
    })
}

/// Answer a disco `<iq type="get"/>` addressed to `owner`
///
/// Returns `None` when the stanza is not a disco query about commands.
#[must_use]
pub fn answer(
    registry: &CommandRegistry,
    groups: &dyn GroupLookup,
    owner: &Jid,
    header: &IqHeader,
    stanza: &Element,
) -> Option<Element> {
    if header.iq_type != "get" {
        return None;
    }

    if let Some(query) = stanza.child("query", NS_DISCO_ITEMS) {
        if query.attr("node") != Some(NS_COMMANDS) {
            return None;
        }
        let mut reply = Element::with_ns("query", NS_DISCO_ITEMS).attr_set("node", NS_COMMANDS);
        for item in items(registry, groups, owner, &header.from) {
            reply.push_child(item.to_element());
        }
        return Some(header.result().child_add(reply));
    }

    let query = stanza.child("query", NS_DISCO_INFO)?;
    let node = query.attr("node")?;
    let reply = match info(registry, groups, owner, &header.from, node) {
        Some(info) => header.result().child_add(info.to_element(node)),
        None => header.error(super::CommandError::ItemNotFound.to_element()),
    };
    Some(reply)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::{CommandDefinition, CommandResult, StepData, handler_fn};
    use crate::roster::Roster;
    use crate::stanza::NS_X_DATA;

    fn jid(s: &str) -> Jid {
        Jid::parse(s).unwrap()
    }

    fn def(label: &str, node: &str) -> CommandDefinition {
        CommandDefinition::new(
            label,
            handler_fn(|_, _: &mut StepData| Ok(CommandResult::completed())),
        )
        .with_node(node)
    }

    fn registry() -> CommandRegistry {
        let registry = CommandRegistry::new();
        let owner = jid("owner@example.com");
        registry.register(&owner, def("Status", "status")).unwrap();
        registry
            .register(
                &owner,
                def("Public", "public")
                    .allow_magic("@ALL@")
                    .with_features(vec!["urn:example:extra".to_string()]),
            )
            .unwrap();
        registry
    }

    #[test]
    fn features_include_base_namespace_once() {
        let features = features(&registry(), &jid("owner@example.com"));
        assert_eq!(features[0], NS_COMMANDS);
        assert!(features.contains(&NS_X_DATA.to_string()));
        assert!(features.contains(&"urn:example:extra".to_string()));
        assert_eq!(features.iter().filter(|f| *f == NS_X_DATA).count(), 1);
    }

    #[test]
    fn features_without_commands() {
        let features = features(&CommandRegistry::new(), &jid("owner@example.com"));
        assert_eq!(features, vec![NS_COMMANDS.to_string()]);
    }

    #[test]
    fn items_are_filtered_by_authorization() {
        let registry = registry();
        let owner = jid("owner@example.com");
        let roster = Roster::new();

        let own = items(&registry, &roster, &owner, &jid("owner@example.com/phone"));
        assert_eq!(own.len(), 2);

        let stranger = items(&registry, &roster, &owner, &jid("stranger@example.com"));
        assert_eq!(stranger.len(), 1);
        assert_eq!(stranger[0].node, "public");
        assert_eq!(stranger[0].jid, owner);
    }

    #[test]
    fn info_for_command_list_and_node() {
        let registry = registry();
        let owner = jid("owner@example.com");
        let roster = Roster::new();

        let list = info(&registry, &roster, &owner, &owner, NS_COMMANDS).unwrap();
        assert_eq!(list.identities[0].kind, "command-list");

        let node = info(&registry, &roster, &owner, &owner, "status").unwrap();
        assert_eq!(node.identities[0].kind, "command-node");
        assert_eq!(node.identities[0].name.as_deref(), Some("Status"));
        assert!(node.features.contains(&NS_X_DATA.to_string()));

        assert!(info(&registry, &roster, &owner, &jid("x@example.com"), "status").is_none());
        assert!(info(&registry, &roster, &owner, &owner, "missing").is_none());
    }

    #[test]
    fn answers_items_query() {
        let registry = registry();
        let owner = jid("owner@example.com");
        let stanza = Element::parse(&format!(
            r#"<iq type="get" id="d1" from="stranger@example.com/x"><query xmlns="{NS_DISCO_ITEMS}" node="{NS_COMMANDS}"/></iq>"#
        ))
        .unwrap();
        let header = IqHeader::parse(&stanza).unwrap();

        let reply = answer(&registry, &Roster::new(), &owner, &header, &stanza).unwrap();
        assert_eq!(reply.attr("type"), Some("result"));
        let query = reply.child("query", NS_DISCO_ITEMS).unwrap();
        let nodes: Vec<&str> = query.children().filter_map(|i| i.attr("node")).collect();
        assert_eq!(nodes, vec!["public"]);
    }

    #[test]
    fn ignores_unrelated_queries() {
        let registry = registry();
        let owner = jid("owner@example.com");
        let stanza = Element::parse(&format!(
            r#"<iq type="get" id="d2" from="a@example.com"><query xmlns="{NS_DISCO_ITEMS}"/></iq>"#
        ))
        .unwrap();
        let header = IqHeader::parse(&stanza).unwrap();
        assert!(answer(&registry, &Roster::new(), &owner, &header, &stanza).is_none());
    }
}
