use discord_api::{Embed, EmbedField, EmbedFooter};

const ACCENT: u32 = 0x5865F2;

fn code_block(text: &str) -> String {
    format!("```\n{text}\n```")
}

fn field(name: &str, value: String) -> EmbedField {
    EmbedField {
        name: name.into(),
        value,
        inline: false,
    }
}

/// Connection details sent to the user who deployed an instance.
pub fn deployed(vps_id: &str, image: &str, connection_string: &str) -> Embed {
    Embed {
        title: Some(format!("VPS Deployed! ({image})")),
        description: Some("Your new VPS is ready. Connect with the command below.".into()),
        color: Some(ACCENT),
        fields: vec![
            field("VPS ID", format!("`{vps_id}`")),
            field("Connection Command", code_block(connection_string)),
        ],
        footer: Some(EmbedFooter {
            text: format!("Use /stop {vps_id} to shut it down."),
        }),
    }
}

/// Notice sent to the new owner of a reassigned instance.
pub fn received(vps_id: &str, image: Option<&str>, connection_string: Option<&str>) -> Embed {
    let connection = connection_string
        .map(code_block)
        .unwrap_or_else(|| "Not available".into());

    Embed {
        title: Some(format!("VPS Received! ({})", image.unwrap_or("N/A"))),
        description: Some("A VPS has been sent to you.".into()),
        color: Some(ACCENT),
        fields: vec![
            field("VPS ID", format!("`{vps_id}`")),
            field("Connection Command", connection),
        ],
        footer: None,
    }
}
