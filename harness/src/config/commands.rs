//! Command templates sent to the application under test
//!
//! Placeholders: `{user}`, `{password}`, `{peer}` and `{message}`. The
//! defaults drive the Elixir client through IEx.

/// Log fragments that acknowledge a command took effect
///
/// When a pattern is set, the barrier after the matching phase waits for one
/// acknowledging record per command sent instead of waiting for output to
/// settle.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AckPatterns {
    pub server_ready: Option<String>,
    pub client_ready: Option<String>,
    pub signup: Option<String>,
    pub add_contact: Option<String>,
    pub send_message: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandTemplates {
    pub signup: String,
    pub add_contact: String,
    pub send_message: String,
    pub message: String,
    pub user_prefix: String,
    pub password_prefix: String,
    pub acks: AckPatterns,
}

impl Default for CommandTemplates {
    fn default() -> Self {
        Self {
            signup: r#"token = Client.Account.signup("{user}", "{password}")"#.to_string(),
            add_contact: r#"contact_uuid_{peer} = Client.Contact.add_contact(nil, "{peer}")"#.to_string(),
            send_message: r#"Client.Message.send("{message}", contact_uuid_{peer})"#.to_string(),
            message: "Hello!".to_string(),
            user_prefix: "user".to_string(),
            password_prefix: "password".to_string(),
            acks: AckPatterns::default(),
        }
    }
}

impl CommandTemplates {
    pub fn user(&self, id: usize) -> String {
        format!("{}{}", self.user_prefix, id)
    }

    pub fn password(&self, id: usize) -> String {
        format!("{}{}", self.password_prefix, id)
    }

    fn render(&self, template: &str, id: usize, peer: Option<usize>) -> String {
        let mut command = template
            .replace("{user}", &self.user(id))
            .replace("{password}", &self.password(id))
            .replace("{message}", &self.message);
        if let Some(peer) = peer {
            command = command.replace("{peer}", &self.user(peer));
        }
        command
    }

    /// Registration command for client `id`
    pub fn signup_for(&self, id: usize) -> String {
        self.render(&self.signup, id, None)
    }

    /// Contact registration from `id` to `peer`; `None` when they are the same
    pub fn add_contact_for(&self, id: usize, peer: usize) -> Option<String> {
        (id != peer).then(|| self.render(&self.add_contact, id, Some(peer)))
    }

    /// Message from `id` to `peer`; `None` when they are the same
    pub fn send_message_for(&self, id: usize, peer: usize) -> Option<String> {
        (id != peer).then(|| self.render(&self.send_message, id, Some(peer)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_commands() {
        let commands = CommandTemplates::default();

        assert_eq!(commands.signup_for(3), r#"token = Client.Account.signup("user3", "password3")"#);
        assert_eq!(
            commands.add_contact_for(0, 2).unwrap(),
            r#"contact_uuid_user2 = Client.Contact.add_contact(nil, "user2")"#
        );
        assert_eq!(
            commands.send_message_for(1, 0).unwrap(),
            r#"Client.Message.send("Hello!", contact_uuid_user0)"#
        );
    }

    #[test]
    fn test_never_targets_self() {
        let commands = CommandTemplates::default();
        assert!(commands.add_contact_for(4, 4).is_none());
        assert!(commands.send_message_for(4, 4).is_none());
    }

    #[test]
    fn test_custom_template() {
        let commands = CommandTemplates {
            send_message: "send {peer} {message}".to_string(),
            message: "hi there".to_string(),
            user_prefix: "u".to_string(),
            ..CommandTemplates::default()
        };
        assert_eq!(commands.send_message_for(0, 1).unwrap(), "send u1 hi there");
    }
}
