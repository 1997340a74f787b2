// Bus topic grammar.
//
//   prefix/resource/id
//   prefix/resource/id/method
//   prefix/bridgeId/resource/id
//   prefix/bridgeId/resource/id/method
//
// Three segments after the prefix are ambiguous. When the first of them is
// a catalog resource type the topic is read as `resource/id/method`,
// otherwise as `bridgeId/resource/id`.

use hue2mqtt_api::catalog;

/// Raw segments of a command topic, before validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TopicParts<'a> {
    pub bridge_id: Option<&'a str>,
    pub resource_type: &'a str,
    pub resource_id: &'a str,
    pub method: Option<&'a str>,
}

/// Split `topic` according to the grammar. Returns `None` for any other
/// shape, including topics outside `prefix` and empty segments.
pub fn split<'a>(prefix: &str, topic: &'a str) -> Option<TopicParts<'a>> {
    let rest = topic.strip_prefix(prefix)?.strip_prefix('/')?;
    let segments: Vec<&str> = rest.split('/').collect();
    if segments.iter().any(|s| s.is_empty()) {
        return None;
    }

    let parts = match segments.as_slice() {
        &[resource_type, resource_id] => TopicParts {
            bridge_id: None,
            resource_type,
            resource_id,
            method: None,
        },
        &[resource_type, resource_id, method] if catalog::contains(resource_type) => TopicParts {
            bridge_id: None,
            resource_type,
            resource_id,
            method: Some(method),
        },
        &[bridge_id, resource_type, resource_id] => TopicParts {
            bridge_id: Some(bridge_id),
            resource_type,
            resource_id,
            method: None,
        },
        &[bridge_id, resource_type, resource_id, method] => TopicParts {
            bridge_id: Some(bridge_id),
            resource_type,
            resource_id,
            method: Some(method),
        },
        _ => return None,
    };
    Some(parts)
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn two_segments() {
        assert_eq!(
            split("hue2mqtt", "hue2mqtt/light/abc123"),
            Some(TopicParts {
                bridge_id: None,
                resource_type: "light",
                resource_id: "abc123",
                method: None,
            })
        );
    }

    #[test]
    fn three_segments_with_known_resource_carry_a_method() {
        let parts = split("hue2mqtt", "hue2mqtt/light/abc123/set").expect("parsed");
        assert_eq!(parts.bridge_id, None);
        assert_eq!(parts.method, Some("set"));
    }

    #[test]
    fn three_segments_with_unknown_first_name_a_bridge() {
        let parts = split("hue2mqtt", "hue2mqtt/001788fffe/light/abc123").expect("parsed");
        assert_eq!(parts.bridge_id, Some("001788fffe"));
        assert_eq!(parts.resource_type, "light");
        assert_eq!(parts.method, None);
    }

    #[test]
    fn four_segments() {
        let parts = split("hue2mqtt", "hue2mqtt/b1/grouped_light/g1/get").expect("parsed");
        assert_eq!(parts.bridge_id, Some("b1"));
        assert_eq!(parts.resource_type, "grouped_light");
        assert_eq!(parts.resource_id, "g1");
        assert_eq!(parts.method, Some("get"));
    }

    #[test]
    fn other_shapes_are_ignored() {
        for topic in [
            "hue2mqtt",
            "hue2mqtt/",
            "hue2mqtt/light",
            "hue2mqtt/light//set",
            "hue2mqtt/a/b/c/d/e",
            "other/light/abc",
            "hue2mqttx/light/abc",
        ] {
            assert_eq!(split("hue2mqtt", topic), None, "{topic}");
        }
    }

    #[test]
    fn multi_level_prefix() {
        let parts = split("home/hue", "home/hue/light/abc/set").expect("parsed");
        assert_eq!(parts.resource_type, "light");
        assert_eq!(parts.method, Some("set"));
    }
}
