use bot_commons::*;

fn main() {
    start_everything("info,confession_bot=debug", confession_bot::entry());
}
