//! Topic naming scheme for the agent's channels

/// Retained payload published when the agent comes online
pub const STATUS_ONLINE: &str = "online";

/// Retained payload delivered by the broker's last will on ungraceful loss
pub const STATUS_OFFLINE: &str = "offline";

/// The broker topics owned by one device identity
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicSet {
    device: String,
    /// Inbound RPC request topic
    pub request: String,
    /// Retained heartbeat topic
    pub heartbeat: String,
    /// Retained online/offline status topic
    pub status: String,
}

impl TopicSet {
    pub fn new(room: &str, device: &str) -> Self {
        Self {
            device: device.to_string(),
            request: format!("home/{room}/{device}/rpc/req"),
            heartbeat: format!("home/{room}/{device}/hb"),
            status: format!("home/{room}/{device}/status"),
        }
    }

    /// Default reply topic for a response.
    ///
    /// Responses to requests whose correlation id could not be read go to
    /// the device's well-known `unmatched` address.
    pub fn default_reply(&self, corr: Option<&str>) -> String {
        match corr {
            Some(corr) => format!("home/resp/{}/{}", self.device, corr),
            None => format!("home/resp/{}/unmatched", self.device),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_topic_paths() {
        let topics = TopicSet::new("office", "deskpc");
        assert_eq!(topics.request, "home/office/deskpc/rpc/req");
        assert_eq!(topics.heartbeat, "home/office/deskpc/hb");
        assert_eq!(topics.status, "home/office/deskpc/status");
    }

    #[test]
    fn test_default_reply_with_corr() {
        let topics = TopicSet::new("office", "deskpc");
        assert_eq!(topics.default_reply(Some("c-42")), "home/resp/deskpc/c-42");
    }

    #[test]
    fn test_default_reply_without_corr() {
        let topics = TopicSet::new("office", "deskpc");
        assert_eq!(topics.default_reply(None), "home/resp/deskpc/unmatched");
    }
}
