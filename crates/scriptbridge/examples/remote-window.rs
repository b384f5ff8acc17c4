//! A "browser" thread exposes its window object over a Unix socket; a
//! "plugin" thread scripts it and registers a listener the window calls
//! back into while the plugin is still blocked in its own call.
//!
//! Run with:
//!   SCRIPTBRIDGE_LOG_LEVEL=debug cargo run --example remote-window

use std::cell::RefCell;
use std::fs;
use std::rc::Rc;
use std::thread;

use scriptbridge::logging;
use scriptbridge::transport::{SocketConfig, SocketTransport, Transport};
use scriptbridge::{
    create_proxy, create_stub, ChannelConfig, ChannelMode, ChannelRegistry, DynamicObject, Identifier, ObjectRef,
    Provenance, RouteId, RouteIdAllocator, ScriptObject, Variant,
};

const CHANNEL: &str = "remote-window";
const WINDOW_ROUTE: RouteId = RouteId(1);

fn window() -> ObjectRef {
    let listeners: Rc<RefCell<Vec<ObjectRef>>> = Rc::default();
    let add = listeners.clone();
    DynamicObject::new()
        .with_property("title", "scriptbridge demo")
        .with_property("width", 800)
        .with_method("addListener", move |args| {
            let listener = args.first()?.as_object()?.clone();
            add.borrow_mut().push(listener);
            Some(Variant::Void)
        })
        .with_method("resize", move |args| {
            let width = args.first()?.as_int()?;
            let listeners = listeners.borrow().clone();
            for listener in &listeners {
                listener.invoke(&Identifier::from("onResize"), &[Variant::Int(width)])?;
            }
            Some(Variant::Int(listeners.len() as i32))
        })
        .into_object()
}

fn browser(config: SocketConfig) -> Result<(), String> {
    let registry = ChannelRegistry::new(RouteIdAllocator::starting_at(16), ChannelConfig::default());
    let channel = registry
        .get_or_create(CHANNEL, ChannelMode::Server, |name, mode| {
            let transport: Box<dyn Transport> = Box::new(SocketTransport::open(name, mode, &config)?);
            Ok(transport)
        })
        .map_err(|e| e.to_string())?;

    let _window = create_stub(window(), &channel, WINDOW_ROUTE, None);
    channel.run();
    eprintln!("browser: plugin went away");
    Ok(())
}

fn plugin(config: SocketConfig) -> Result<(), String> {
    let registry = ChannelRegistry::new(RouteIdAllocator::starting_at(16), ChannelConfig::default());
    let channel = registry
        .get_or_create(CHANNEL, ChannelMode::Client, |name, mode| {
            let transport: Box<dyn Transport> = Box::new(SocketTransport::open(name, mode, &config)?);
            Ok(transport)
        })
        .map_err(|e| e.to_string())?;

    let window = create_proxy(&channel, WINDOW_ROUTE, None, Provenance::default());
    let title = window.get_property(&Identifier::from("title"));
    eprintln!("plugin: window title is {title:?}");

    let resized: Rc<RefCell<Vec<i32>>> = Rc::default();
    let seen = resized.clone();
    let listener = DynamicObject::new()
        .with_method("onResize", move |args| {
            let width = args.first()?.as_int()?;
            eprintln!("plugin: window resized to {width}");
            seen.borrow_mut().push(width);
            Some(Variant::Void)
        })
        .into_object();

    window
        .invoke(&Identifier::from("addListener"), &[Variant::Object(listener)])
        .ok_or("addListener failed")?;
    let notified = window
        .invoke(&Identifier::from("resize"), &[Variant::Int(1024)])
        .ok_or("resize failed")?;
    eprintln!("plugin: resize notified {notified:?} listener(s), saw {:?}", resized.borrow());

    drop(window);
    registry.shutdown();
    Ok(())
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    logging::init_from_env();

    let dir = std::env::temp_dir().join(format!("scriptbridge-demo-{}", std::process::id()));
    fs::create_dir_all(&dir)?;
    let config = SocketConfig {
        dir: dir.clone(),
        ..SocketConfig::default()
    };

    let browser_config = config.clone();
    let browser = thread::Builder::new()
        .name("browser".to_string())
        .spawn(move || browser(browser_config))?;

    let result = plugin(config);
    let browser_result = browser.join().map_err(|_| "browser thread panicked")?;
    let _ = fs::remove_dir_all(&dir);

    result?;
    browser_result?;
    Ok(())
}
