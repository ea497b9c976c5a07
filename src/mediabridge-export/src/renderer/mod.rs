//! Renderer interface: transport control and playback status.

mod buffering;

pub(crate) use buffering::BufferingThrottle;

use crate::context::Context;
use crate::gateway::Dispatch;
use crate::interface::renderer::*;
use mediabridge_bus::{BusError, BusResult, MethodCall, ReplyAddress, Value};
use mediabridge_core::models::{codes, RENDERER_ERROR_DOMAIN};
use mediabridge_core::{
    Completion, ExtError, PlaylistDirectory, PlaylistId, Renderer, RendererEvent, RendererStatus,
    SeekMode, SignalHandlerId,
};
use std::rc::Rc;

pub(crate) fn dispatch(
    ctx: &Context,
    renderer: &Rc<dyn Renderer>,
    call: &MethodCall,
) -> BusResult<Dispatch> {
    let to = call.reply_address();
    let mut args = call.args();

    match call.member.as_str() {
        PLAY => renderer.play(ack(ctx, to)),
        PLAY_OBJECT => {
            let object_id: String = args.next()?;
            renderer.play_object(&object_id, ack(ctx, to));
        }
        PLAY_URI => {
            let uri: String = args.next()?;
            renderer.play_uri(&uri, ack(ctx, to));
        }
        STOP => renderer.stop(ack(ctx, to)),
        PAUSE => renderer.pause(ack(ctx, to)),
        RESUME => renderer.resume(ack(ctx, to)),
        NEXT => renderer.next(ack(ctx, to)),
        PREVIOUS => renderer.previous(ack(ctx, to)),
        GOTO_INDEX => {
            let index: u32 = args.next()?;
            renderer.goto_index(index, ack(ctx, to));
        }
        ASSIGN_PLAYLIST => {
            let id = PlaylistId(args.next()?);
            assign_playlist(ctx, renderer.as_ref(), id, to);
        }
        SET_POSITION => {
            let mode: u32 = args.next()?;
            let mode = SeekMode::from_u32(mode).ok_or_else(|| BusError::InvalidArgs {
                member: call.member.clone(),
                position: 0,
                expected: "a seek mode (0 absolute, 1 relative)",
            })?;
            let seconds: i32 = args.next()?;
            renderer.set_position(mode, seconds, position_reply(ctx, to));
        }
        GET_POSITION => renderer.get_position(position_reply(ctx, to)),
        GET_STATUS => {
            let ctx = ctx.clone();
            renderer.get_status(Box::new(move |result| {
                ctx.reply_result(to, result, |status| {
                    status_args(ctx.playlists.as_ref(), status)
                })
            }));
        }
        _ => return Ok(Dispatch::NotHandled),
    }
    Ok(Dispatch::Handled)
}

/// Id 0 unassigns; any other id must name a known playlist.
fn assign_playlist(ctx: &Context, renderer: &dyn Renderer, id: PlaylistId, to: ReplyAddress) {
    let playlist = if id.is_valid() {
        match ctx.playlists.lookup(id) {
            Some(playlist) => Some(playlist),
            None => {
                ctx.reply_error(
                    to,
                    ExtError::new(
                        RENDERER_ERROR_DOMAIN,
                        codes::PLAYLIST_NOT_FOUND,
                        format!("no playlist with id {}", id.0),
                    ),
                );
                return;
            }
        }
    } else {
        None
    };
    ctx.reply_result(to, renderer.assign_playlist(playlist), |()| Vec::new());
}

fn ack(ctx: &Context, to: ReplyAddress) -> Completion<()> {
    let ctx = ctx.clone();
    Box::new(move |result| ctx.reply_result(to, result, |()| Vec::new()))
}

fn position_reply(ctx: &Context, to: ReplyAddress) -> Completion<i32> {
    let ctx = ctx.clone();
    Box::new(move |result| ctx.reply_result(to, result, |seconds| vec![Value::I32(seconds)]))
}

/// `(playlist id, index, state, object id)`
fn status_args(playlists: &dyn PlaylistDirectory, status: RendererStatus) -> Vec<Value> {
    vec![
        Value::U32(playlists.id_of(status.playlist.as_ref()).0),
        Value::U32(status.index),
        Value::U32(status.state.as_u32()),
        Value::Str(status.object_id.unwrap_or_default()),
    ]
}

pub(crate) fn connect(
    ctx: &Context,
    renderer: &dyn Renderer,
    path: &str,
    buffering: &Rc<BufferingThrottle>,
) -> SignalHandlerId {
    let ctx = ctx.clone();
    let path = path.to_owned();
    let buffering = Rc::clone(buffering);
    renderer.connect_renderer_events(Box::new(move |event| match event {
        RendererEvent::StateChanged(state) => {
            buffering.reset();
            ctx.emit(&path, INTERFACE, STATE_CHANGED, vec![Value::U32(state.as_u32())]);
        }
        RendererEvent::PlaylistChanged(playlist) => {
            let id = ctx.playlists.id_of(playlist.as_ref());
            ctx.emit(&path, INTERFACE, PLAYLIST_CHANGED, vec![Value::U32(id.0)]);
        }
        RendererEvent::MediaChanged { index, object_id } => ctx.emit(
            &path,
            INTERFACE,
            MEDIA_CHANGED,
            vec![
                Value::I32(*index),
                Value::Str(object_id.clone().unwrap_or_default()),
            ],
        ),
        RendererEvent::MetadataChanged { name, values } => ctx.emit(
            &path,
            INTERFACE,
            METADATA_CHANGED,
            vec![
                Value::str(name.as_str()),
                Value::Array(values.iter().map(Value::variant).collect()),
            ],
        ),
        RendererEvent::BufferingInfo(fraction) => buffering.update(*fraction),
    }))
}
