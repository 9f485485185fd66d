use anyhow::anyhow;

use super::{
    connection::ConnectionManager, message_type, Field, MenuItemType, MENU_SLOT_RB_CD,
};
use crate::message::TrackMetadata;
use crate::Result;

/// How many menu items to request per `RENDER_MENU` round trip before
/// asking the player for the next batch.
const MENU_BATCH_SIZE: u32 = 64;

/// Resolves a track's tag metadata (title, artist, album, ...) from the
/// player's attached media by issuing a metadata request followed by a
/// paginated menu render, mirroring the walk rekordbox itself performs
/// when browsing a deck.
pub(crate) async fn fetch_track_metadata(
    connections: &mut ConnectionManager,
    our_device_num: u8,
    device_num: u8,
    ip: &[u8; 4],
    slot: u8,
    track_type: u8,
    rekordbox_id: u32,
) -> Result<TrackMetadata> {
    let conn = connections.get(device_num, ip).await?;

    conn.send_message(
        message_type::MEDIA_REQUEST,
        vec![
            Field::dmst(our_device_num, 0x1, slot, track_type),
            Field::U32(rekordbox_id),
        ],
    )
    .await?;

    let response = conn.read_message().await?;
    if response.ty != message_type::MEDIA_RESPONSE {
        return Err(anyhow!("unexpected reply to metadata request: {}", response.ty).into());
    }
    let num_fields = response.arg_u32(1)?;

    let mut metadata = TrackMetadata::default();

    // A count of 0xffffffff means the player has nothing to render for
    // this track; there's no menu to page through at all.
    if num_fields == 0xffff_ffff {
        return Ok(metadata);
    }

    let mut offset = 0;
    let mut artwork_id = None;

    while offset < num_fields {
        let limit = MENU_BATCH_SIZE.min(num_fields - offset);
        conn.send_message(
            message_type::RENDER_MENU_REQUEST,
            vec![
                Field::dmst(our_device_num, 0x1, slot, track_type),
                Field::U32(offset),
                Field::U32(limit),
                Field::U32(0x0),
                Field::U32(limit),
                Field::U32(0x0),
            ],
        )
        .await?;

        loop {
            let response = conn.read_message().await?;

            if response.ty == message_type::MENU_FOOTER {
                break;
            }

            if response.ty == message_type::MENU_ITEM {
                let item_type = MenuItemType::from_u32(response.arg_u32(6)?);
                let value = response.arg_string(3)?;
                apply_menu_item(&mut metadata, item_type, value);

                if item_type == MenuItemType::TrackTitle {
                    let id = response.arg_u32(8)?;
                    if id > 0 {
                        artwork_id = Some(id);
                    }
                }
            }
        }

        offset += limit;
    }

    if let Some(id) = artwork_id {
        conn.send_message(
            message_type::ARTWORK_REQUEST,
            vec![Field::dmst(our_device_num, 0x8, slot, track_type), Field::U32(id)],
        )
        .await?;
        // Artwork itself isn't surfaced through `TrackMetadata` today; we
        // still drain the response so the connection stays in sync.
        let _ = conn.read_message().await?;
    }

    Ok(metadata)
}

fn apply_menu_item(metadata: &mut TrackMetadata, item_type: MenuItemType, value: &str) {
    match item_type {
        MenuItemType::TrackTitle => metadata.title = Some(value.to_string()),
        MenuItemType::Artist => metadata.artist = Some(value.to_string()),
        MenuItemType::AlbumTitle => metadata.album = Some(value.to_string()),
        MenuItemType::Genre => metadata.genre = Some(value.to_string()),
        MenuItemType::Key => metadata.key = Some(value.to_string()),
        MenuItemType::Duration => metadata.duration_secs = value.parse().ok(),
        MenuItemType::Tempo => metadata.bpm = value.parse::<f32>().ok().map(|t| t / 100.0),
        other => {
            metadata.fields.insert(format!("{}", other), value.to_string());
        }
    }
}

/// Asks a player's database server what's mounted in a media slot,
/// without touching any track metadata.
pub(crate) async fn fetch_media_summary(
    connections: &mut ConnectionManager,
    our_device_num: u8,
    device_num: u8,
    ip: &[u8; 4],
    slot: u8,
) -> Result<(u16, u16)> {
    let conn = connections.get(device_num, ip).await?;

    conn.send_message(
        message_type::MEDIA_REQUEST,
        vec![
            Field::dmst(our_device_num, 0x1, slot, MENU_SLOT_RB_CD),
            Field::U32(0),
        ],
    )
    .await?;

    let response = conn.read_message().await?;
    if response.ty != message_type::MEDIA_RESPONSE {
        return Err(anyhow!("unexpected reply to media summary request: {}", response.ty).into());
    }

    let track_count = response.arg_u32(1)? as u16;
    let playlist_count = response.arg_u32(2).unwrap_or(0) as u16;
    Ok((track_count, playlist_count))
}
