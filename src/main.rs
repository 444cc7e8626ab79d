fn main() -> anyhow::Result<()> {
    music_box_lib::run()
}
