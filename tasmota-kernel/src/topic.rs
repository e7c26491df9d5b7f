/// Découpage d'un topic Tasmota `<prefix>/<device-id>/<kind>`.
///
/// Le device-id peut lui-même contenir des `/` : seuls le premier et le
/// dernier segment sont fixes, tout ce qui est entre les deux est l'id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Topic<'a> {
    pub prefix: &'a str,
    pub device_id: &'a str,
    pub kind: &'a str,
}

pub const SEPARATOR: char = '/';

impl<'a> Topic<'a> {
    pub fn parse(raw: &'a str) -> Option<Self> {
        let (prefix, rest) = raw.split_once(SEPARATOR)?;
        let (device_id, kind) = rest.rsplit_once(SEPARATOR)?;
        if device_id.is_empty() {
            return None;
        }
        Some(Self { prefix, device_id, kind })
    }
}

/// Topic de commande `cmnd/<device-id>/<command>`
pub fn command_topic(device_id: &str, command: &str) -> String {
    format!("cmnd{SEPARATOR}{device_id}{SEPARATOR}{command}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_simple_topic() {
        let t = Topic::parse("tele/plug-1/LWT").unwrap();
        assert_eq!(t.prefix, "tele");
        assert_eq!(t.device_id, "plug-1");
        assert_eq!(t.kind, "LWT");
    }

    #[test]
    fn test_parse_device_id_with_separator() {
        let t = Topic::parse("stat/living/tv/plug/RESULT").unwrap();
        assert_eq!(t.prefix, "stat");
        assert_eq!(t.device_id, "living/tv/plug");
        assert_eq!(t.kind, "RESULT");
    }

    #[test]
    fn test_parse_rejects_short_topics() {
        assert_eq!(Topic::parse("tele"), None);
        assert_eq!(Topic::parse("tele/LWT"), None);
        assert_eq!(Topic::parse("tele//LWT"), None);
        assert_eq!(Topic::parse(""), None);
    }

    #[test]
    fn test_command_topic() {
        assert_eq!(command_topic("plug-1", "STATUS"), "cmnd/plug-1/STATUS");
        assert_eq!(command_topic("a/b", "MODULE"), "cmnd/a/b/MODULE");
    }
}
